//! Expiry sweeps.
//!
//! Payments expire in bulk (one store call flips every overdue pending row).
//! Subscriptions expire row by row because each carries side effects: the
//! channel membership is revoked and the user is told why. One row failing
//! must never block the rest of the sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::{channel_access::ChannelAccessPort, notifier::NotifierPort},
    application::use_cases::payments::{PaymentRepo, UserRepo},
    domain::entities::subscription::Subscription,
};

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    /// Rows still flagged active whose `end_date` has passed.
    async fn list_expired_active(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>>;

    async fn deactivate(&self, id: Uuid) -> AppResult<()>;
}

/// Stats for one subscription sweep, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryStats {
    pub expired: usize,
    pub revoke_failures: usize,
}

pub struct ExpirySweeps {
    payments: Arc<dyn PaymentRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    users: Arc<dyn UserRepo>,
    access: Arc<dyn ChannelAccessPort>,
    notifier: Arc<dyn NotifierPort>,
}

impl ExpirySweeps {
    pub fn new(
        payments: Arc<dyn PaymentRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        users: Arc<dyn UserRepo>,
        access: Arc<dyn ChannelAccessPort>,
        notifier: Arc<dyn NotifierPort>,
    ) -> Self {
        Self {
            payments,
            subscriptions,
            users,
            access,
            notifier,
        }
    }

    /// Flip every overdue pending payment to EXPIRED in one store call.
    /// Expired payments drop out of the poll sweep on the next tick.
    pub async fn expire_payments(&self) -> AppResult<u64> {
        let swept = self.payments.expire_overdue(Utc::now()).await?;
        if swept > 0 {
            info!(swept, "Expired overdue pending payments");
        }
        Ok(swept)
    }

    /// Deactivate every lapsed subscription and revoke channel access.
    /// Each row is handled independently so one failure cannot strand the
    /// rest of the batch as phantom members.
    pub async fn expire_subscriptions(&self) -> ExpiryStats {
        let now = Utc::now();
        let lapsed = match self.subscriptions.list_expired_active(now).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to list lapsed subscriptions");
                return ExpiryStats::default();
            }
        };

        let mut stats = ExpiryStats::default();
        for sub in lapsed {
            if let Err(e) = self.expire_one(&sub).await {
                stats.revoke_failures += 1;
                warn!(subscription_id = %sub.id, error = %e, "Failed to expire subscription");
                continue;
            }
            stats.expired += 1;
        }

        if stats.expired > 0 || stats.revoke_failures > 0 {
            info!(
                expired = stats.expired,
                failures = stats.revoke_failures,
                "Subscription expiry sweep finished"
            );
        }
        stats
    }

    async fn expire_one(&self, sub: &Subscription) -> AppResult<()> {
        self.subscriptions.deactivate(sub.id).await?;

        let Some(user) = self.users.get_user(sub.user_id).await? else {
            error!(subscription_id = %sub.id, "Lapsed subscription references missing user");
            return Ok(());
        };

        self.access.revoke(sub.channel_id, user.telegram_id).await?;

        // The row is already deactivated and the member removed; a failed
        // message must not count as a sweep failure.
        let text = format!(
            "Your subscription ended on {}. Renew any time to rejoin the channel.",
            sub.end_date.format("%Y-%m-%d %H:%M UTC")
        );
        if let Err(e) = self.notifier.notify(user.telegram_id, &text).await {
            warn!(telegram_id = user.telegram_id, error = %e, "Expiry notification failed (non-critical)");
        }

        Ok(())
    }
}
