use async_trait::async_trait;

use crate::app_error::AppResult;

/// Channel access controller port - grants and revokes membership of the
/// private channel. Implemented against the Telegram Bot API.
#[async_trait]
pub trait ChannelAccessPort: Send + Sync {
    /// Grant access for a user, returning an invite link to send them.
    /// Also lifts any previous ban so the link is usable.
    async fn grant(&self, channel_id: i64, telegram_id: i64) -> AppResult<String>;

    /// Revoke access by removing the user from the channel.
    async fn revoke(&self, channel_id: i64, telegram_id: i64) -> AppResult<()>;
}
