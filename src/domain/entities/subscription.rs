use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::plan::PlanType;

/// A grant of channel access for one user over `[start_date, end_date)`.
///
/// For a given (user, channel) pair at most one row is active at decision
/// time; extension logic reads the single latest-by-end_date active row.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_id: i64,
    pub plan_type: PlanType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    /// The payment that created this row. Extensions do not rewrite it.
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether this row currently grants access.
    pub fn grants_access_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_date >= now
    }
}
