use async_trait::async_trait;

use crate::app_error::AppResult;

/// Best-effort user notification port. Failures are logged by callers and
/// never affect committed payment or subscription state.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    async fn notify(&self, telegram_id: i64, text: &str) -> AppResult<()>;
}
