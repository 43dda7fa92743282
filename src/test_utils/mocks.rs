use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        channel_access::ChannelAccessPort,
        notifier::NotifierPort,
        payment_gateway::ExternalRef,
    },
    application::use_cases::{
        expiry::SubscriptionRepo,
        extension::{self, ExtensionDecision},
        payments::{NewPayment, PaymentRepo, UserRepo},
        reconciliation::{CompletionOutcome, CompletionStore},
    },
    domain::entities::{
        payment::{Payment, PaymentStatus},
        plan::PlanType,
        subscription::Subscription,
        user::User,
    },
};

/// Channel id used across tests.
pub const CHANNEL_ID: i64 = -1_001_234_567_890;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    payments: HashMap<Uuid, Payment>,
    subscriptions: HashMap<Uuid, Subscription>,
}

/// In-memory store backing every repo contract plus the completion
/// transaction. A single lock over all tables makes the completion path
/// atomic the same way the real store's transaction does, including the
/// uniqueness guard on external references.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All subscription rows for a user, oldest first.
    pub fn subscriptions_for(&self, user_id: Uuid) -> Vec<Subscription> {
        let inner = self.inner.lock().unwrap();
        let mut subs: Vec<_> = inner
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        subs
    }

    /// Rewrite a payment's deadline, for expiry scenarios.
    pub fn force_expires_at(&self, payment_id: Uuid, expires_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.payments.get_mut(&payment_id) {
            p.expires_at = expires_at;
        }
    }

    /// Seed a subscription row directly.
    pub fn insert_subscription(
        &self,
        user_id: Uuid,
        channel_id: i64,
        end_date: DateTime<Utc>,
        is_active: bool,
    ) -> Subscription {
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id,
            channel_id,
            plan_type: PlanType::Week,
            start_date: end_date - Duration::days(7),
            end_date,
            is_active,
            payment_id: None,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(sub.id, sub.clone());
        sub
    }

    fn ref_already_recorded(inner: &Inner, external_ref: &ExternalRef) -> bool {
        inner.payments.values().any(|p| match external_ref {
            ExternalRef::TelegramChargeId(s) => p.telegram_charge_id.as_deref() == Some(s),
            ExternalRef::TxHash(s) | ExternalRef::ChargeId(s) => {
                p.crypto_tx_hash.as_deref() == Some(s)
            }
        })
    }
}

#[async_trait]
impl UserRepo for InMemoryStore {
    async fn upsert_telegram_user(
        &self,
        telegram_id: i64,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> AppResult<User> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        if let Some(user) = inner
            .users
            .values_mut()
            .find(|u| u.telegram_id == telegram_id)
        {
            user.first_name = first_name.to_string();
            user.last_name = last_name.map(str::to_string);
            user.username = username.map(str::to_string);
            user.updated_at = now;
            return Ok(user.clone());
        }

        let user = User {
            id: Uuid::new_v4(),
            telegram_id,
            first_name: first_name.to_string(),
            last_name: last_name.map(str::to_string),
            username: username.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }
}

#[async_trait]
impl PaymentRepo for InMemoryStore {
    async fn create(&self, input: &NewPayment) -> AppResult<Payment> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .payments
            .values()
            .any(|p| p.invoice_payload.as_deref() == Some(&input.invoice_payload))
        {
            return Err(AppError::Database("duplicate invoice_payload".into()));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            amount: input.amount,
            currency: input.currency.clone(),
            plan_type: input.plan_type,
            payment_method: input.payment_method,
            status: PaymentStatus::Pending,
            invoice_payload: Some(input.invoice_payload.clone()),
            telegram_charge_id: None,
            crypto_address: None,
            crypto_tx_hash: None,
            expected_amount: None,
            expires_at: input.expires_at,
            created_at: now,
            updated_at: now,
        };
        inner.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self.inner.lock().unwrap().payments.get(&id).cloned())
    }

    async fn get_by_invoice_payload(&self, payload: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.invoice_payload.as_deref() == Some(payload))
            .cloned())
    }

    async fn set_intent_details(
        &self,
        id: Uuid,
        crypto_address: Option<&str>,
        expected_amount: Option<Decimal>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let payment = inner.payments.get_mut(&id).ok_or(AppError::NotFound)?;
        payment.crypto_address = crypto_address.map(str::to_string);
        payment.expected_amount = expected_amount;
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending_polled(&self, now: DateTime<Utc>) -> AppResult<Vec<Payment>> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<_> = inner
            .payments
            .values()
            .filter(|p| {
                p.status == PaymentStatus::Pending
                    && p.payment_method.is_polled()
                    && p.expires_at >= now
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            (a.created_at, &a.invoice_payload).cmp(&(b.created_at, &b.invoice_payload))
        });
        Ok(pending)
    }

    async fn mark_failed(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let payment = inner.payments.get_mut(&id).ok_or(AppError::NotFound)?;
        if payment.status == PaymentStatus::Pending {
            payment.status = PaymentStatus::Failed;
            payment.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.inner.lock().unwrap().payments.remove(&id);
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut swept = 0;
        for payment in inner.payments.values_mut() {
            if payment.status == PaymentStatus::Pending && payment.expires_at < now {
                payment.status = PaymentStatus::Expired;
                payment.updated_at = now;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl SubscriptionRepo for InMemoryStore {
    async fn list_expired_active(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|s| s.is_active && s.end_date < now)
            .cloned()
            .collect())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let sub = inner.subscriptions.get_mut(&id).ok_or(AppError::NotFound)?;
        sub.is_active = false;
        Ok(())
    }
}

#[async_trait]
impl CompletionStore for InMemoryStore {
    async fn complete_payment(
        &self,
        payment_id: Uuid,
        external_ref: &ExternalRef,
        channel_id: i64,
        plan: PlanType,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<CompletionOutcome> {
        // One lock over all tables stands in for the real store's
        // serialized completion transaction.
        let mut inner = self.inner.lock().unwrap();

        if Self::ref_already_recorded(&inner, external_ref) {
            return Ok(CompletionOutcome::AlreadyProcessed);
        }

        let Some(payment) = inner.payments.get(&payment_id).cloned() else {
            return Ok(CompletionOutcome::NotFound);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(CompletionOutcome::NotPending);
        }

        {
            let p = inner.payments.get_mut(&payment_id).unwrap();
            p.status = PaymentStatus::Completed;
            p.updated_at = now;
            match external_ref {
                ExternalRef::TelegramChargeId(s) => p.telegram_charge_id = Some(s.clone()),
                ExternalRef::TxHash(s) | ExternalRef::ChargeId(s) => {
                    p.crypto_tx_hash = Some(s.clone())
                }
            }
        }
        let payment = inner.payments.get(&payment_id).unwrap().clone();

        let active: Vec<_> = inner
            .subscriptions
            .values()
            .filter(|s| s.user_id == payment.user_id && s.channel_id == channel_id)
            .cloned()
            .collect();

        let subscription = match extension::decide(&active, plan, duration, now) {
            ExtensionDecision::Extend {
                subscription_id,
                new_start,
                new_end,
                plan,
            } => {
                let sub = inner.subscriptions.get_mut(&subscription_id).unwrap();
                sub.start_date = new_start;
                sub.end_date = new_end;
                sub.plan_type = plan;
                sub.clone()
            }
            ExtensionDecision::Fresh { start, end, plan } => {
                let sub = Subscription {
                    id: Uuid::new_v4(),
                    user_id: payment.user_id,
                    channel_id,
                    plan_type: plan,
                    start_date: start,
                    end_date: end,
                    is_active: true,
                    payment_id: Some(payment.id),
                    created_at: now,
                };
                inner.subscriptions.insert(sub.id, sub.clone());
                sub
            }
        };

        Ok(CompletionOutcome::Completed {
            payment,
            subscription,
        })
    }
}

/// Recording channel access mock. Optionally fails for one telegram id.
#[derive(Default)]
pub struct MockChannelAccess {
    grants: Mutex<Vec<(i64, i64)>>,
    revokes: Mutex<Vec<(i64, i64)>>,
    fail_for: Option<i64>,
}

impl MockChannelAccess {
    pub fn failing_for(telegram_id: i64) -> Self {
        Self {
            fail_for: Some(telegram_id),
            ..Self::default()
        }
    }

    pub fn granted(&self) -> usize {
        self.grants.lock().unwrap().len()
    }

    pub fn revoked(&self) -> usize {
        self.revokes.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelAccessPort for MockChannelAccess {
    async fn grant(&self, channel_id: i64, telegram_id: i64) -> AppResult<String> {
        if self.fail_for == Some(telegram_id) {
            return Err(AppError::ProviderUnavailable("channel api down".into()));
        }
        self.grants.lock().unwrap().push((channel_id, telegram_id));
        Ok(format!("https://t.me/+invite_{}", telegram_id))
    }

    async fn revoke(&self, channel_id: i64, telegram_id: i64) -> AppResult<()> {
        if self.fail_for == Some(telegram_id) {
            return Err(AppError::ProviderUnavailable("channel api down".into()));
        }
        self.revokes.lock().unwrap().push((channel_id, telegram_id));
        Ok(())
    }
}

/// Recording notifier mock.
#[derive(Default)]
pub struct MockNotifier {
    messages: Mutex<Vec<(i64, String)>>,
}

impl MockNotifier {
    pub fn sent(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn last_message(&self) -> Option<String> {
        self.messages
            .lock()
            .unwrap()
            .last()
            .map(|(_, text)| text.clone())
    }
}

#[async_trait]
impl NotifierPort for MockNotifier {
    async fn notify(&self, telegram_id: i64, text: &str) -> AppResult<()> {
        self.messages
            .lock()
            .unwrap()
            .push((telegram_id, text.to_string()));
        Ok(())
    }
}
