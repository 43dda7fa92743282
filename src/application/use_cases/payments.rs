//! Payment intent creation and the payment/user store contracts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{PayTarget, PaymentGatewayPort, ProviderIntent},
    domain::entities::{
        payment::{Payment, PaymentMethod},
        plan::{PlanCatalog, PlanType},
        user::User,
    },
};

// ============================================================================
// Store contracts
// ============================================================================

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create the user on first interaction, or refresh display fields.
    async fn upsert_telegram_user(
        &self,
        telegram_id: i64,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> AppResult<User>;

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
}

/// Input for a new pending payment row.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub plan_type: PlanType,
    pub payment_method: PaymentMethod,
    pub invoice_payload: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn create(&self, input: &NewPayment) -> AppResult<Payment>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Payment>>;

    async fn get_by_invoice_payload(&self, payload: &str) -> AppResult<Option<Payment>>;

    /// Attach provider details learned at intent creation.
    async fn set_intent_details(
        &self,
        id: Uuid,
        crypto_address: Option<&str>,
        expected_amount: Option<Decimal>,
    ) -> AppResult<()>;

    /// Pending payments of polled methods that have not yet expired.
    async fn list_pending_polled(&self, now: DateTime<Utc>) -> AppResult<Vec<Payment>>;

    /// Terminal failure; no subscription side effects.
    async fn mark_failed(&self, id: Uuid) -> AppResult<()>;

    /// Remove a row whose external intent never came to exist.
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Bulk-expire pending payments past their deadline. Returns the number
    /// of rows swept.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

// ============================================================================
// Use cases
// ============================================================================

/// Everything the caller needs to present a created intent to the user.
#[derive(Debug, Clone)]
pub struct PaymentIntentDetails {
    pub payment: Payment,
    pub pay_target: PayTarget,
    pub pay_amount: Decimal,
    pub pay_currency: String,
}

pub struct PaymentUseCases {
    users: Arc<dyn UserRepo>,
    payments: Arc<dyn PaymentRepo>,
    stars_gateway: Arc<dyn PaymentGatewayPort>,
    crypto_gateway: Arc<dyn PaymentGatewayPort>,
    catalog: PlanCatalog,
    intent_ttl: Duration,
}

impl PaymentUseCases {
    pub fn new(
        users: Arc<dyn UserRepo>,
        payments: Arc<dyn PaymentRepo>,
        stars_gateway: Arc<dyn PaymentGatewayPort>,
        crypto_gateway: Arc<dyn PaymentGatewayPort>,
        catalog: PlanCatalog,
        intent_ttl: Duration,
    ) -> Self {
        Self {
            users,
            payments,
            stars_gateway,
            crypto_gateway,
            catalog,
            intent_ttl,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub async fn ensure_user(
        &self,
        telegram_id: i64,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> AppResult<User> {
        self.users
            .upsert_telegram_user(telegram_id, first_name, last_name, username)
            .await
    }

    /// Create a payment intent: a pending payment row plus an external
    /// intent at the provider.
    ///
    /// The row is persisted before the provider call and deleted again if
    /// that call fails, so no pending row ever references a non-existent
    /// external intent.
    pub async fn create_intent(
        &self,
        user: &User,
        plan: PlanType,
        method: PaymentMethod,
    ) -> AppResult<PaymentIntentDetails> {
        let gateway = self.gateway_for(method)?;
        let price = self
            .catalog
            .price(plan, method)
            .ok_or_else(|| AppError::UnknownPlan(plan.to_string()))?
            .clone();

        let now = Utc::now();
        let order_id = generate_order_id();
        let payment = self
            .payments
            .create(&NewPayment {
                user_id: user.id,
                amount: price.amount,
                currency: price.currency.clone(),
                plan_type: plan,
                payment_method: method,
                invoice_payload: order_id.clone(),
                expires_at: now + self.intent_ttl,
            })
            .await?;

        let description = format!("Channel access: {} plan", plan);
        let intent: ProviderIntent = match gateway
            .create_intent(&order_id, &price, &description)
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                // Roll the row back; a failed delete only leaves a pending
                // row that the expiry sweep will collect.
                if let Err(del_err) = self.payments.delete(payment.id).await {
                    tracing::warn!(
                        payment_id = %payment.id,
                        error = %del_err,
                        "Failed to roll back payment row after provider error"
                    );
                }
                return Err(e);
            }
        };

        let (crypto_address, expected_amount) = match (&intent.pay_target, method.is_polled()) {
            (PayTarget::Address(addr), _) => (Some(addr.as_str()), Some(intent.pay_amount)),
            (PayTarget::InvoiceUrl(_), true) => (None, Some(intent.pay_amount)),
            (PayTarget::InvoiceUrl(_), false) => (None, None),
        };
        self.payments
            .set_intent_details(payment.id, crypto_address, expected_amount)
            .await?;

        let payment = self
            .payments
            .get(payment.id)
            .await?
            .ok_or(AppError::NotFound)?;

        tracing::info!(
            payment_id = %payment.id,
            user_id = %user.id,
            plan = %plan,
            method = %method,
            "Created payment intent"
        );

        Ok(PaymentIntentDetails {
            payment,
            pay_target: intent.pay_target,
            pay_amount: intent.pay_amount,
            pay_currency: intent.pay_currency,
        })
    }

    fn gateway_for(&self, method: PaymentMethod) -> AppResult<&Arc<dyn PaymentGatewayPort>> {
        if method == PaymentMethod::TelegramStars {
            return Ok(&self.stars_gateway);
        }
        if self.crypto_gateway.method() == method {
            return Ok(&self.crypto_gateway);
        }
        Err(AppError::UnsupportedMethod(method.to_string()))
    }
}

/// Order reference embedded in external invoices. Random enough that a
/// collision on the unique `invoice_payload` column is not a concern.
fn generate_order_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    format!("ord_{}", hex::encode(bytes))
}
