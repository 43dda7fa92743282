//! Subscription extension calculator.
//!
//! Pure decision logic: given the current persisted subscription state for a
//! (user, channel) pair, decide whether a successful payment extends the
//! existing window or opens a fresh one. The caller is responsible for
//! reading the subscription rows inside the same transaction that marks the
//! payment completed, so two concurrent completions cannot both observe "no
//! active subscription".

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::entities::{plan::PlanType, subscription::Subscription};

/// Outcome of the extension decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionDecision {
    /// Push an existing active row forward in place. The row's payment
    /// back-reference is not rewritten.
    Extend {
        subscription_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        plan: PlanType,
    },
    /// Create a new row referencing the originating payment.
    Fresh {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        plan: PlanType,
    },
}

/// Decide how a successful payment affects subscription state.
///
/// `active` holds the active rows for the (user, channel) pair as read at
/// decision time. Under the single-active invariant there is at most one;
/// if more exist the one with the latest `end_date` wins.
pub fn decide(
    active: &[Subscription],
    plan: PlanType,
    duration: Duration,
    now: DateTime<Utc>,
) -> ExtensionDecision {
    let current = active
        .iter()
        .filter(|s| s.grants_access_at(now))
        .max_by_key(|s| s.end_date);

    match current {
        Some(existing) => ExtensionDecision::Extend {
            subscription_id: existing.id,
            new_start: existing.end_date,
            new_end: existing.end_date + duration,
            plan,
        },
        None => ExtensionDecision::Fresh {
            start: now,
            end: now + duration,
            plan,
        },
    }
}
