use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    app_error::AppResult,
    domain::entities::{
        payment::{Payment, PaymentMethod},
        plan::PlanPrice,
    },
};

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Where the user sends money for a created intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PayTarget {
    /// Hosted checkout page (Stars invoice link, PSP invoice URL).
    InvoiceUrl(String),
    /// Raw receiving address for a direct ledger transfer.
    Address(String),
}

/// Canonical shape of a freshly created external payment intent.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderIntent {
    /// Provider-side reference for later status queries.
    pub provider_reference: String,
    pub pay_target: PayTarget,
    /// Amount the provider quoted, in `pay_currency`.
    pub pay_amount: Decimal,
    pub pay_currency: String,
}

/// External evidence that a payment reached a terminal-success state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub external_ref: ExternalRef,
    pub paid_amount: Option<Decimal>,
    /// Provider-side event timestamp, used for causality checks.
    pub observed_at: Option<DateTime<Utc>>,
}

/// The unique external reference attached to a completed payment. The store
/// column it lands in depends on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalRef {
    TelegramChargeId(String),
    TxHash(String),
    /// Hosted-invoice confirmation id issued by the PSP.
    ChargeId(String),
}

impl ExternalRef {
    pub fn as_str(&self) -> &str {
        match self {
            ExternalRef::TelegramChargeId(s)
            | ExternalRef::TxHash(s)
            | ExternalRef::ChargeId(s) => s,
        }
    }
}

/// Result of polling a pending payment.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Terminal success; drive the completion transaction.
    Confirmed(Confirmation),
    /// Terminal failure reported by the provider (failed/refunded/expired).
    Failed { provider_status: String },
    /// Not terminal yet. An unrecognized provider status also lands here:
    /// never silently complete on a status we do not know.
    Pending { status_label: Option<String> },
}

// ============================================================================
// Payment Gateway Port
// ============================================================================

/// Payment gateway port - one implementation per `PaymentMethod` variant.
///
/// `create_intent` talks to the external provider only; the pending payment
/// row is managed by the caller so a provider failure leaves no orphan
/// intent behind.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// The payment method this adapter serves.
    fn method(&self) -> PaymentMethod;

    /// Create an external payment intent for `order_id` at the given price.
    async fn create_intent(
        &self,
        order_id: &str,
        price: &PlanPrice,
        description: &str,
    ) -> AppResult<ProviderIntent>;

    /// Query the provider for the current state of a pending payment.
    /// Read-only and side-effect-free.
    async fn poll(&self, payment: &Payment) -> AppResult<PollOutcome>;
}
