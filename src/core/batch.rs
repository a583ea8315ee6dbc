use crate::core::analyzer::Analyzer;
use crate::domain::model::{AnalysisResult, MessageOutcome};
use crate::utils::error::{GatewayError, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 逐則分析一批訊息。單則失敗只記錄並略過，不會讓整批失敗。
pub struct BatchCoordinator {
    analyzer: Arc<Analyzer>,
    max_concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(analyzer: Arc<Analyzer>, max_concurrency: usize) -> Self {
        Self {
            analyzer,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 每則輸入對應一個結果，順序與輸入相同
    pub async fn analyze_outcomes(
        &self,
        ctx: &CancellationToken,
        messages: Vec<String>,
    ) -> Result<Vec<MessageOutcome>> {
        if messages.is_empty() {
            return Err(GatewayError::ValidationError {
                message: "Messages array cannot be empty".to_string(),
            });
        }

        let total = messages.len();
        let analyzer = &self.analyzer;

        // buffered 會保持輸入順序，同時最多 max_concurrency 個請求在跑
        let outcomes: Vec<MessageOutcome> = stream::iter(messages)
            .map(|message| async move {
                match analyzer.analyze_one(ctx, &message).await {
                    Ok(result) => MessageOutcome::Analyzed(result),
                    Err(e) => {
                        tracing::warn!("Error analyzing message '{}': {}", message, e);
                        MessageOutcome::Failed {
                            content: message,
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        if failed > 0 {
            tracing::warn!("⚠️ {} of {} messages failed analysis", failed, total);
        } else {
            tracing::debug!("Analyzed {} messages", total);
        }

        Ok(outcomes)
    }

    /// HTTP 回應用：只保留成功的結果，長度可能小於輸入
    pub async fn analyze_batch(
        &self,
        ctx: &CancellationToken,
        messages: Vec<String>,
    ) -> Result<Vec<AnalysisResult>> {
        let outcomes = self.analyze_outcomes(ctx, messages).await?;
        Ok(outcomes
            .into_iter()
            .filter_map(MessageOutcome::into_result)
            .collect())
    }
}
