use crate::adapters::{join_url, with_cancellation};
use crate::config::ModerationOptions;
use crate::domain::ports::BackendAdapter;
use crate::utils::error::BackendError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// 兩種 chat-completion 協定只差在路徑、預設值、認證與回應外層
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProtocol {
    /// Ollama `/api/chat`
    Ollama,
    /// OpenAI 相容 `/v1/chat/completions`
    OpenAi,
}

impl ChatProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            ChatProtocol::Ollama => "ollama",
            ChatProtocol::OpenAi => "openai",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ChatProtocol::Ollama => "/api/chat",
            ChatProtocol::OpenAi => "/v1/chat/completions",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ChatProtocol::Ollama => "http://localhost:11434",
            ChatProtocol::OpenAi => "https://api.openai.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ChatProtocol::Ollama => "llama-guard3:1b",
            ChatProtocol::OpenAi => "gpt-4o-mini",
        }
    }

    fn extract_content(&self, body: &str) -> Result<String, BackendError> {
        let decode_error = |e: serde_json::Error| BackendError::Decode {
            message: e.to_string(),
        };

        let message = match self {
            ChatProtocol::Ollama => {
                serde_json::from_str::<OllamaChatResponse>(body)
                    .map_err(decode_error)?
                    .message
            }
            ChatProtocol::OpenAi => serde_json::from_str::<OpenAiChatResponse>(body)
                .map_err(decode_error)?
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| BackendError::Decode {
                    message: "response contained no choices".to_string(),
                })?
                .message,
        };

        message.content.ok_or_else(|| BackendError::Decode {
            message: "response message has no content".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChatChoice>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionBackend {
    client: Client,
    protocol: ChatProtocol,
    base_url: String,
    model: String,
    api_token: Option<String>,
}

impl ChatCompletionBackend {
    pub fn new(
        client: Client,
        protocol: ChatProtocol,
        options: &ModerationOptions,
        api_token: Option<String>,
    ) -> Self {
        Self {
            client,
            protocol,
            base_url: options
                .endpoint
                .clone()
                .unwrap_or_else(|| protocol.default_base_url().to_string()),
            model: options
                .model
                .clone()
                .unwrap_or_else(|| protocol.default_model().to_string()),
            api_token,
        }
    }

    pub fn protocol(&self) -> ChatProtocol {
        self.protocol
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        user_message: &str,
        system_instruction: &str,
    ) -> Result<String, BackendError> {
        let url = join_url(&self.base_url, self.protocol.path())?;

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            // Ollama 預設串流回應，這裡要一次拿到完整 JSON
            stream: match self.protocol {
                ChatProtocol::Ollama => Some(false),
                ChatProtocol::OpenAi => None,
            },
        };
        let body = serde_json::to_vec(&request).map_err(|e| BackendError::RequestBuild {
            message: format!("marshaling request: {}", e),
        })?;

        tracing::debug!("Making {} request to: {}", self.protocol.name(), url);
        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        tracing::debug!("Backend response status: {}", status);

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::status(status.as_u16(), &body));
        }

        let body = response.text().await?;
        self.protocol.extract_content(&body)
    }
}

#[async_trait]
impl BackendAdapter for ChatCompletionBackend {
    fn name(&self) -> &str {
        self.protocol.name()
    }

    async fn analyze(
        &self,
        ctx: &CancellationToken,
        user_message: &str,
        system_instruction: &str,
    ) -> Result<String, BackendError> {
        with_cancellation(ctx, self.complete(user_message, system_instruction)).await
    }
}
