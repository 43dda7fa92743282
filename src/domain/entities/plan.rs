use std::collections::HashMap;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::payment::PaymentMethod;

/// Subscription plan tier. Prices and durations are deployment
/// configuration, not part of the plan identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "plan_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PlanType {
    Day,
    Week,
    Month,
}

impl PlanType {
    /// All plan tiers, in display order.
    pub fn all() -> &'static [PlanType] {
        &[PlanType::Day, PlanType::Week, PlanType::Month]
    }
}

/// Price of a plan in one payment method's currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanPrice {
    pub amount: Decimal,
    pub currency: String,
}

/// A plan's configured pricing and access duration.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub duration: Duration,
    /// Price when paying with Telegram Stars.
    pub stars: PlanPrice,
    /// Price when paying with either crypto method.
    pub crypto: PlanPrice,
}

/// Static mapping of plan tiers to prices and durations, built from
/// configuration at startup.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanType, PlanSpec>,
}

impl PlanCatalog {
    pub fn new(plans: HashMap<PlanType, PlanSpec>) -> Self {
        Self { plans }
    }

    pub fn get(&self, plan: PlanType) -> Option<&PlanSpec> {
        self.plans.get(&plan)
    }

    pub fn duration(&self, plan: PlanType) -> Option<Duration> {
        self.plans.get(&plan).map(|s| s.duration)
    }

    /// Resolve the price for a plan under a given payment method.
    pub fn price(&self, plan: PlanType, method: PaymentMethod) -> Option<&PlanPrice> {
        let spec = self.plans.get(&plan)?;
        Some(match method {
            PaymentMethod::TelegramStars => &spec.stars,
            PaymentMethod::CryptoHostedInvoice | PaymentMethod::CryptoLedgerScan => &spec.crypto,
        })
    }
}
