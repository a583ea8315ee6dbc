// Adapters layer: one BackendAdapter per inference provider, each owning its wire protocol.

pub mod chat;
pub mod hosted;

pub use chat::{ChatCompletionBackend, ChatProtocol};
pub use hosted::HostedExecutionBackend;

use crate::config::{BackendKind, Settings};
use crate::domain::ports::BackendAdapter;
use crate::utils::error::{BackendError, GatewayError, Result};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 依設定選擇後端實作；缺少憑證等錯誤在啟動時就會回報
pub fn build_backend(settings: &Settings) -> Result<Arc<dyn BackendAdapter>> {
    let client = http_client(settings.request_timeout)?;

    let backend: Arc<dyn BackendAdapter> = match settings.backend {
        BackendKind::Ollama => Arc::new(ChatCompletionBackend::new(
            client,
            ChatProtocol::Ollama,
            &settings.options,
            None,
        )),
        BackendKind::OpenAi => Arc::new(ChatCompletionBackend::new(
            client,
            ChatProtocol::OpenAi,
            &settings.options,
            settings.api_token.clone(),
        )),
        BackendKind::Hosted => Arc::new(HostedExecutionBackend::new(
            client,
            &settings.options,
            settings.api_token.clone(),
            settings.poll_interval,
        )?
        .with_max_wait(settings.max_wait)),
    };

    tracing::info!("🔌 Using {} moderation backend", backend.name());
    Ok(backend)
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::ConfigError {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// 取消時直接丟棄進行中的請求 future，底層連線隨之中止
pub(crate) async fn with_cancellation<T, F>(
    ctx: &CancellationToken,
    call: F,
) -> std::result::Result<T, BackendError>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(BackendError::Cancelled),
        result = call => result,
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> std::result::Result<reqwest::Url, BackendError> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    reqwest::Url::parse(&raw).map_err(|e| BackendError::RequestBuild {
        message: format!("invalid URL {}: {}", raw, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModerationOptions;
    use crate::core::verdict::ScoreTable;

    fn settings(backend: BackendKind, api_token: Option<&str>) -> Settings {
        Settings {
            backend,
            options: ModerationOptions::default(),
            api_token: api_token.map(str::to_string),
            score_table: ScoreTable::default(),
            max_concurrency: 4,
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_build_each_backend() {
        assert_eq!(
            build_backend(&settings(BackendKind::Ollama, None)).unwrap().name(),
            "ollama"
        );
        assert_eq!(
            build_backend(&settings(BackendKind::OpenAi, None)).unwrap().name(),
            "openai"
        );
        assert_eq!(
            build_backend(&settings(BackendKind::Hosted, Some("r8_test")))
                .unwrap()
                .name(),
            "hosted"
        );
    }

    #[test]
    fn test_hosted_backend_requires_token() {
        let result = build_backend(&settings(BackendKind::Hosted, None));
        assert!(matches!(
            result,
            Err(GatewayError::MissingConfigError { ref field }) if field == "api_token"
        ));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:11434/", "/api/chat").unwrap().as_str(),
            "http://localhost:11434/api/chat"
        );
        assert!(matches!(
            join_url("not a url", "/api/chat"),
            Err(BackendError::RequestBuild { .. })
        ));
    }

    #[tokio::test]
    async fn test_with_cancellation_returns_promptly() {
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result: std::result::Result<(), BackendError> = with_cancellation(&ctx, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(BackendError::Cancelled)));
    }
}
