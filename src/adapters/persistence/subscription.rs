use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::expiry::SubscriptionRepo,
    domain::entities::subscription::Subscription,
};

pub(super) fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        channel_id: row.get("channel_id"),
        plan_type: row.get("plan_type"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        is_active: row.get("is_active"),
        payment_id: row.get("payment_id"),
        created_at: row.get("created_at"),
    }
}

pub(super) const SELECT_COLS: &str = r#"
    id, user_id, channel_id, plan_type, start_date, end_date, is_active,
    payment_id, created_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn list_expired_active(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE is_active = TRUE AND end_date < $1",
            SELECT_COLS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_subscription).collect())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE subscriptions SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}
