use crate::adapters::{join_url, with_cancellation};
use crate::config::{ModerationOptions, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::domain::ports::BackendAdapter;
use crate::utils::error::{BackendError, GatewayError, Result};
use crate::utils::validation::validate_required_field;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
pub const DEFAULT_MODEL: &str = "meta/llama-guard-3-8b";

/// `owner/name:version` 走版本化預測，`owner/name` 走官方模型端點
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    Version { version: String },
    Official { owner: String, name: String },
}

impl ModelRef {
    pub fn parse(identifier: &str) -> Result<Self> {
        let invalid = |reason: &str| GatewayError::InvalidConfigValueError {
            field: "model".to_string(),
            value: identifier.to_string(),
            reason: reason.to_string(),
        };

        let (path, version) = match identifier.split_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (identifier, None),
        };

        let (owner, name) = path
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| invalid("expected owner/name or owner/name:version"))?;

        match version {
            Some("") => Err(invalid("version must not be empty")),
            Some(version) => Ok(ModelRef::Version {
                version: version.to_string(),
            }),
            None => Ok(ModelRef::Official {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn create_path(&self) -> String {
        match self {
            ModelRef::Version { .. } => "/v1/predictions".to_string(),
            ModelRef::Official { owner, name } => format!("/v1/models/{}/{}/predictions", owner, name),
        }
    }

    fn version(&self) -> Option<&str> {
        match self {
            ModelRef::Version { version } => Some(version.as_str()),
            ModelRef::Official { .. } => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    system_prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    input: PredictionInput<'a>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

impl Prediction {
    /// 只跟隨與 base_url 同源的 `urls.get`，避免把 token 送到其他主機
    fn poll_url(&self, base_url: &str) -> String {
        let fallback = format!("{}/v1/predictions/{}", base_url.trim_end_matches('/'), self.id);

        match self.urls.as_ref().and_then(|urls| urls.get.as_deref()) {
            Some(get) if same_origin(get, base_url) => get.to_string(),
            Some(get) => {
                tracing::warn!("Ignoring prediction URL on foreign origin: {}", get);
                fallback
            }
            None => fallback,
        }
    }

    fn failure_detail(&self) -> String {
        match &self.error {
            Value::Null => "no error detail".to_string(),
            Value::String(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

fn same_origin(candidate: &str, base_url: &str) -> bool {
    match (Url::parse(candidate), Url::parse(base_url)) {
        (Ok(candidate), Ok(base)) => candidate.origin() == base.origin(),
        _ => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 預測輸出必須是字串，其他形狀一律視為錯誤
pub fn output_as_string(output: Value) -> std::result::Result<String, BackendError> {
    match output {
        Value::String(text) => Ok(text),
        other => Err(BackendError::UnexpectedOutput {
            found: json_kind(&other).to_string(),
        }),
    }
}

/// 託管模型執行平台：建立預測，必要時輪詢直到結束
#[derive(Debug, Clone)]
pub struct HostedExecutionBackend {
    client: Client,
    base_url: String,
    model: ModelRef,
    api_token: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl HostedExecutionBackend {
    pub fn new(
        client: Client,
        options: &ModerationOptions,
        api_token: Option<String>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let api_token = validate_required_field("api_token", &api_token)?.clone();
        let model = ModelRef::parse(options.model.as_deref().unwrap_or(DEFAULT_MODEL))?;

        Ok(Self {
            client,
            base_url: options
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            api_token,
            poll_interval,
            max_wait: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// 建立加上輪詢的總等待上限
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    async fn decode(response: Response) -> std::result::Result<Prediction, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::status(status.as_u16(), &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })
    }

    async fn create(
        &self,
        user_message: &str,
        system_instruction: &str,
    ) -> std::result::Result<Prediction, BackendError> {
        let url = join_url(&self.base_url, &self.model.create_path())?;
        let payload = CreatePrediction {
            version: self.model.version(),
            input: PredictionInput {
                prompt: user_message,
                system_prompt: system_instruction,
            },
        };
        let body = serde_json::to_vec(&payload).map_err(|e| BackendError::RequestBuild {
            message: format!("marshaling prediction: {}", e),
        })?;

        tracing::debug!("Creating prediction at: {}", url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "wait")
            .body(body)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Prediction, BackendError> {
        let url = Url::parse(url).map_err(|e| BackendError::RequestBuild {
            message: format!("invalid prediction URL {}: {}", url, e),
        })?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn run(
        &self,
        user_message: &str,
        system_instruction: &str,
    ) -> std::result::Result<String, BackendError> {
        let mut prediction = self.create(user_message, system_instruction).await?;

        loop {
            match prediction.status.as_str() {
                "succeeded" => return output_as_string(prediction.output),
                "failed" | "canceled" | "aborted" => {
                    return Err(BackendError::PredictionFailed {
                        detail: prediction.failure_detail(),
                        status: prediction.status,
                    })
                }
                status => {
                    tracing::debug!("Prediction {} is {}, polling", prediction.id, status);
                    tokio::time::sleep(self.poll_interval).await;
                    let url = prediction.poll_url(&self.base_url);
                    prediction = self.fetch(&url).await?;
                }
            }
        }
    }
}

#[async_trait]
impl BackendAdapter for HostedExecutionBackend {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn analyze(
        &self,
        ctx: &CancellationToken,
        user_message: &str,
        system_instruction: &str,
    ) -> std::result::Result<String, BackendError> {
        let bounded = async {
            tokio::time::timeout(self.max_wait, self.run(user_message, system_instruction))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!("Prediction still pending after {:?}, giving up", self.max_wait);
                    Err(BackendError::Timeout {
                        waited: self.max_wait,
                    })
                })
        };
        with_cancellation(ctx, bounded).await
    }
}
