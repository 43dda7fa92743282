use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A channel member, created on first interaction with the bot.
///
/// `telegram_id` is the immutable external identity anchor; display fields
/// are refreshed on every interaction. Users are never deleted while
/// payments or subscriptions reference them.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
