pub mod toml_config;

use crate::core::verdict::ScoreTable;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_url, Validate,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use toml_config::ModerationFile;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a content moderator. Analyze the following text and respond with 'safe' if the content is safe, or 'unsafe' followed by the category codes (e.g., 'unsafe\\nS1,S2') if any violations are detected.";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 本機 chat-completion daemon (Ollama)
    Ollama,
    /// OpenAI 相容端點
    #[value(name = "openai")]
    OpenAi,
    /// 託管模型執行平台 (Replicate)
    #[value(alias = "replicate")]
    #[serde(alias = "replicate")]
    Hosted,
}

impl BackendKind {
    /// 未指定 token 時退而讀取的供應商慣用環境變數
    pub fn fallback_token_var(&self) -> Option<&'static str> {
        match self {
            BackendKind::Ollama => None,
            BackendKind::OpenAi => Some("OPENAI_API_KEY"),
            BackendKind::Hosted => Some("REPLICATE_API_TOKEN"),
        }
    }
}

/// 傳給分析器與後端的審核選項；`model` 與 `endpoint` 為 `None` 時使用各後端的預設值。
/// `endpoint` 是後端的 base URL，路徑由後端自己決定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationOptions {
    pub system_prompt: String,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

impl Default for ModerationOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: None,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "guard-gateway")]
#[command(about = "Content moderation gateway backed by pluggable LLM backends")]
pub struct GatewayConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "80")]
    pub port: u16,

    #[arg(long, env = "MODERATION_BACKEND", value_enum)]
    pub backend: Option<BackendKind>,

    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    #[arg(long, env = "MODERATION_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "BACKEND_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    #[arg(long = "config", env = "MODERATION_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[arg(long, env = "MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "MAX_WAIT_SECS")]
    pub max_wait_secs: Option<u64>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl GatewayConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 合併 TOML 檔與命令列／環境變數，後者優先
    pub fn resolve(&self) -> Result<Settings> {
        let file = match &self.config_file {
            Some(path) => ModerationFile::from_file(path)?,
            None => ModerationFile::default(),
        };
        self.resolve_with(file)
    }

    pub fn resolve_with(&self, file: ModerationFile) -> Result<Settings> {
        let score_table = file.score_table()?;

        let backend = self
            .backend
            .or(file.moderation.backend)
            .unwrap_or(BackendKind::Ollama);

        let options = ModerationOptions {
            system_prompt: file
                .moderation
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model: self.model.clone().or(file.moderation.model),
            endpoint: self.backend_url.clone().or(file.moderation.endpoint),
        };

        let api_token = self.api_token.clone().or_else(|| {
            backend
                .fallback_token_var()
                .and_then(|var| std::env::var(var).ok())
        });

        let request_timeout_secs = self
            .request_timeout_secs
            .or(file.limits.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let max_wait_secs = self
            .max_wait_secs
            .or(file.limits.max_wait_secs)
            .unwrap_or(request_timeout_secs);

        Ok(Settings {
            backend,
            options,
            api_token,
            score_table,
            max_concurrency: self
                .max_concurrency
                .or(file.limits.max_concurrency)
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_wait: Duration::from_secs(max_wait_secs),
            poll_interval: Duration::from_millis(
                file.limits
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        })
    }
}

/// 啟動時解析完成的設定，之後只讀
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub options: ModerationOptions,
    pub api_token: Option<String>,
    pub score_table: ScoreTable,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.options.endpoint {
            validate_url("backend_url", endpoint)?;
        }
        validate_non_empty_string("system_prompt", &self.options.system_prompt)?;
        validate_positive_number("max_concurrency", self.max_concurrency, 1)?;
        validate_range("max_concurrency", self.max_concurrency, 1, 256)?;
        validate_range(
            "request_timeout_secs",
            self.request_timeout.as_secs(),
            1,
            3600,
        )?;
        validate_range("max_wait_secs", self.max_wait.as_secs(), 1, 3600)?;
        validate_positive_number("poll_interval_ms", self.poll_interval.as_millis() as usize, 1)?;

        tracing::debug!("✅ Gateway configuration validation passed");
        Ok(())
    }
}
