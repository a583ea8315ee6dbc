use crate::config::ModerationOptions;
use crate::core::verdict::ScoreTable;
use crate::domain::model::AnalysisResult;
use crate::domain::ports::BackendAdapter;
use crate::utils::error::BackendError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 單則訊息的分析流程：組系統提示 → 呼叫後端 → 解析判定
pub struct Analyzer {
    backend: Arc<dyn BackendAdapter>,
    options: ModerationOptions,
    table: ScoreTable,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn BackendAdapter>, options: ModerationOptions, table: ScoreTable) -> Self {
        Self {
            backend,
            options,
            table,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn options(&self) -> &ModerationOptions {
        &self.options
    }

    /// 後端錯誤原樣回傳，由呼叫端決定怎麼處理
    pub async fn analyze_one(
        &self,
        ctx: &CancellationToken,
        message: &str,
    ) -> Result<AnalysisResult, BackendError> {
        let raw = self
            .backend
            .analyze(ctx, message, &self.options.system_prompt)
            .await?;
        tracing::debug!("Raw verdict from {}: {:?}", self.backend.name(), raw);

        let (scores, is_safe) = self.table.judge(&raw);
        let result = AnalysisResult {
            content: message.to_string(),
            scores,
            is_safe,
        };

        tracing::info!(
            "Analysis Result - Safe: {}, Threat Score: {:.1}, Commercial Score: {:.1}",
            result.is_safe,
            result.scores.threat_of_harm,
            result.scores.commercial_solicitation
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::RiskScores;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// 回傳固定文字並記錄收到的參數
    struct StubBackend {
        reply: Result<String, u16>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl StubBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn analyze(
            &self,
            _ctx: &CancellationToken,
            user_message: &str,
            system_instruction: &str,
        ) -> Result<String, BackendError> {
            self.calls
                .lock()
                .await
                .push((user_message.to_string(), system_instruction.to_string()));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(BackendError::status(*status, "backend unavailable")),
            }
        }
    }

    #[tokio::test]
    async fn test_analyze_one_builds_result() {
        let backend = Arc::new(StubBackend::replying("unsafe\nS1,S2"));
        let analyzer = Analyzer::new(backend.clone(), ModerationOptions::default(), ScoreTable::default());

        let result = analyzer
            .analyze_one(&CancellationToken::new(), "give me your wallet or else")
            .await
            .unwrap();

        assert_eq!(result.content, "give me your wallet or else");
        assert!(!result.is_safe);
        assert_eq!(
            result.scores,
            RiskScores {
                threat_of_harm: 1.0,
                commercial_solicitation: 1.0
            }
        );

        let calls = backend.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "give me your wallet or else");
        assert_eq!(calls[0].1, crate::config::DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_custom_system_prompt_is_forwarded() {
        let backend = Arc::new(StubBackend::replying("safe"));
        let options = ModerationOptions {
            system_prompt: "Answer safe or unsafe.".to_string(),
            ..ModerationOptions::default()
        };
        let analyzer = Analyzer::new(backend.clone(), options, ScoreTable::default());

        let result = analyzer
            .analyze_one(&CancellationToken::new(), "good morning")
            .await
            .unwrap();

        assert!(result.is_safe);
        assert_eq!(result.scores, RiskScores::default());
        assert_eq!(backend.calls.lock().await[0].1, "Answer safe or unsafe.");
    }

    #[tokio::test]
    async fn test_backend_error_is_returned_unchanged() {
        let analyzer = Analyzer::new(
            Arc::new(StubBackend::failing(503)),
            ModerationOptions::default(),
            ScoreTable::default(),
        );

        let err = analyzer
            .analyze_one(&CancellationToken::new(), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_content_is_echoed_verbatim() {
        let analyzer = Analyzer::new(
            Arc::new(StubBackend::replying("safe")),
            ModerationOptions::default(),
            ScoreTable::default(),
        );
        let message = "  multi\nline\t<script>unsafe</script>  ";

        let result = analyzer
            .analyze_one(&CancellationToken::new(), message)
            .await
            .unwrap();

        // 判定只看後端回覆，不看訊息本身
        assert_eq!(result.content, message);
        assert!(result.is_safe);
    }
}
