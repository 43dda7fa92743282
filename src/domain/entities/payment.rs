use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::plan::PlanType;

/// Payment lifecycle status. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }

    /// Terminal statuses are never overwritten, by webhook or sweep.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "expired" => Ok(PaymentStatus::Expired),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// How a payment is made and monitored. Closed set: each variant has its own
/// gateway adapter, selected statically rather than by string comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentMethod {
    /// Telegram's in-app currency; confirmed by a bot update, not by polling.
    TelegramStars,
    /// Hosted crypto invoice at a PSP; confirmed by webhook or status poll.
    CryptoHostedInvoice,
    /// Raw ledger address scanning against a blockchain explorer.
    CryptoLedgerScan,
}

impl PaymentMethod {
    /// Whether pending payments of this method are reconciled by the
    /// periodic poll sweep.
    pub fn is_polled(&self) -> bool {
        matches!(
            self,
            PaymentMethod::CryptoHostedInvoice | PaymentMethod::CryptoLedgerScan
        )
    }
}

/// A payment intent/attempt against one plan for one user.
///
/// `invoice_payload`, `telegram_charge_id` and `crypto_tx_hash` are each
/// globally unique when present; the store-level constraints on them are the
/// idempotency backbone of the completion transaction.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub plan_type: PlanType,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    /// Our order reference, embedded in the external invoice.
    pub invoice_payload: Option<String>,
    /// Telegram's charge id, attached at completion for Stars payments.
    pub telegram_charge_id: Option<String>,
    /// Receiving address for ledger-scanned payments.
    pub crypto_address: Option<String>,
    /// Ledger transaction hash, attached at completion.
    pub crypto_tx_hash: Option<String>,
    /// Amount expected on-chain, for tolerance-based matching.
    pub expected_amount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
