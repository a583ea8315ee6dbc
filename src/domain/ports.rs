use crate::utils::error::BackendError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 推論後端的共同介面。每個供應商各自封裝自己的傳輸協定，
/// 對上層只暴露「送出提示，取回原始文字」。
///
/// 實作必須在 `ctx` 被取消時儘快回傳 [`BackendError::Cancelled`]。
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        ctx: &CancellationToken,
        user_message: &str,
        system_instruction: &str,
    ) -> Result<String, BackendError>;
}
