use crate::config::BackendKind;
use crate::core::verdict::ScoreTable;
use crate::domain::model::RiskDimension;
use crate::utils::error::{GatewayError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 選用的 TOML 設定檔，所有欄位都可省略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationFile {
    #[serde(default)]
    pub moderation: ModerationSection,
    #[serde(default)]
    pub limits: LimitsSection,
    /// 違規代碼 → 風險維度，會疊加在預設對照表上
    #[serde(default)]
    pub scoring: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationSection {
    pub backend: Option<BackendKind>,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsSection {
    pub max_concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    /// 託管預測的總等待上限，未設定時沿用 request_timeout_secs
    pub max_wait_secs: Option<u64>,
}

impl ModerationFile {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(GatewayError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| GatewayError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${REPLICATE_API_TOKEN})，找不到的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| GatewayError::ConfigError {
            message: format!("Invalid placeholder pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn score_table(&self) -> Result<ScoreTable> {
        let mut table = ScoreTable::default();
        for (code, dimension) in &self.scoring {
            let dimension = dimension.parse::<RiskDimension>().map_err(|reason| {
                GatewayError::InvalidConfigValueError {
                    field: format!("scoring.{}", code),
                    value: dimension.clone(),
                    reason,
                }
            })?;
            table.insert(code.trim(), dimension);
        }
        Ok(table)
    }
}
