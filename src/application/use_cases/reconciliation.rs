//! Payment reconciliation engine.
//!
//! Two entry points converge on the same completion transaction: the webhook
//! path (signed push from the hosted-invoice provider) and the poll/sweep
//! path (active status queries for every pending crypto payment). Telegram
//! Stars confirmations arrive through a third, bot-driven entry that reuses
//! the identical completion path.
//!
//! Correctness against concurrent deliveries rests entirely on the store:
//! the completion transaction is atomic and the unique constraints on
//! external references make a duplicate confirmation fail harmlessly. The
//! in-process recently-processed cache is a latency optimization only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        channel_access::ChannelAccessPort,
        notifier::NotifierPort,
        payment_gateway::{Confirmation, ExternalRef, PaymentGatewayPort, PollOutcome},
    },
    application::use_cases::payments::{PaymentRepo, UserRepo},
    domain::entities::{
        payment::{Payment, PaymentMethod},
        plan::{PlanCatalog, PlanType},
        subscription::Subscription,
    },
};

// ============================================================================
// Completion store contract
// ============================================================================

/// Result of driving the completion transaction for one payment.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The payment transitioned to COMPLETED and the subscription row was
    /// created or extended, all in one transaction.
    Completed {
        payment: Payment,
        subscription: Subscription,
    },
    /// The external reference was already recorded (here or on another
    /// payment); nothing changed. Not an error.
    AlreadyProcessed,
    /// The payment is in a terminal non-completed state (failed/expired).
    NotPending,
    NotFound,
}

/// The atomic completion transaction, as a contract on the store.
///
/// Implementations must make "read latest active subscription" + "mark
/// payment completed with the external reference attached" + "upsert
/// subscription" appear atomic to any concurrent completion attempt for the
/// same (user, channel), and must roll everything back on any failure so the
/// payment stays pending and safe to retry.
#[async_trait]
pub trait CompletionStore: Send + Sync {
    async fn complete_payment(
        &self,
        payment_id: Uuid,
        external_ref: &ExternalRef,
        channel_id: i64,
        plan: PlanType,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<CompletionOutcome>;
}

/// Refund hook for in-app-currency payments, used only when the deployment
/// enables automatic refunds after completion.
#[async_trait]
pub trait RefundPort: Send + Sync {
    async fn refund(&self, telegram_id: i64, charge_id: &str) -> AppResult<()>;
}

// ============================================================================
// Matching rules
// ============================================================================

/// A candidate transaction observed on the ledger.
#[derive(Debug, Clone)]
pub struct LedgerTx {
    pub tx_hash: String,
    pub to_address: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Absolute amount tolerance, in the asset's display unit.
pub fn amount_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Whether an observed amount settles an expected amount.
pub fn amount_matches(expected: Decimal, actual: Decimal) -> bool {
    (expected - actual).abs() <= amount_tolerance()
}

/// Whether a ledger transaction settles a pending payment: destination
/// matches, amount within tolerance, and the transaction is not older than
/// the payment (causality).
pub fn tx_matches(payment: &Payment, tx: &LedgerTx) -> bool {
    let Some(address) = payment.crypto_address.as_deref() else {
        return false;
    };
    let Some(expected) = payment.expected_amount else {
        return false;
    };
    address == tx.to_address && amount_matches(expected, tx.amount) && tx.timestamp >= payment.created_at
}

/// First transaction in `txs` that settles `payment`.
pub fn find_matching_tx<'a>(payment: &Payment, txs: &'a [LedgerTx]) -> Option<&'a LedgerTx> {
    txs.iter().find(|tx| tx_matches(payment, tx))
}

// ============================================================================
// Webhook payload
// ============================================================================

/// Minimal provider webhook body. Nothing here is trusted before the
/// signature over the raw bytes has been verified.
#[derive(Debug, Deserialize)]
pub struct InvoiceWebhookEvent {
    #[serde(alias = "payment_id")]
    pub order_id: String,
    pub status: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    /// Provider confirmation id; falls back to the order id when absent.
    pub charge_id: Option<String>,
    /// Unix seconds of the provider-side event.
    pub paid_at: Option<i64>,
}

/// How a verified webhook delivery was handled. All variants are success
/// responses to the provider; only signature/body problems are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Completed,
    MarkedFailed,
    /// Duplicate delivery for an already-processed payment.
    AlreadyProcessed,
    /// No payment matches the embedded order id. Logged and accepted so the
    /// provider does not retry-storm us.
    UnknownOrder,
    /// Non-terminal or unrecognized status, or an amount outside tolerance.
    /// No state change; the payment stays pending.
    NoChange,
}

/// Verify a provider signature: lowercase hex HMAC-SHA256 over the raw
/// payload bytes with the shared webhook secret.
pub fn verify_signature(secret: &SecretString, signature: &str, raw: &[u8]) -> AppResult<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| AppError::Internal("HMAC key error".into()))?;
    mac.update(raw);
    let expected = hex::encode(mac.finalize().into_bytes());

    if constant_time_compare(signature.trim(), &expected) {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// Recently-processed reference cache
// ============================================================================

/// Bounded fast-path duplicate filter. Cleared wholesale when full; lost on
/// restart and invalid across instances, which is fine because the store's
/// unique constraints are the authoritative guard.
pub struct RecentRefs {
    seen: Mutex<HashSet<String>>,
    cap: usize,
}

impl RecentRefs {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            cap,
        }
    }

    pub fn contains(&self, external_ref: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(external_ref)
    }

    /// Record a reference after its completion committed. Never called on
    /// failure paths, so a transient store error cannot poison the cache.
    pub fn insert(&self, external_ref: &str) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.len() >= self.cap {
            seen.clear();
        }
        seen.insert(external_ref.to_string());
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Stats for one poll sweep, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub completed: usize,
    pub failed: usize,
    pub errors: usize,
}

pub struct ReconciliationEngine {
    payments: Arc<dyn PaymentRepo>,
    users: Arc<dyn UserRepo>,
    store: Arc<dyn CompletionStore>,
    crypto_gateway: Arc<dyn PaymentGatewayPort>,
    access: Arc<dyn ChannelAccessPort>,
    notifier: Arc<dyn NotifierPort>,
    /// Present only when the deployment auto-refunds Stars payments.
    stars_refunder: Option<Arc<dyn RefundPort>>,
    catalog: PlanCatalog,
    channel_id: i64,
    webhook_secret: SecretString,
    /// Fixed delay between outbound provider calls during a sweep.
    poll_call_delay: std::time::Duration,
    recent_refs: RecentRefs,
}

const RECENT_REFS_CAP: usize = 4096;

impl ReconciliationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payments: Arc<dyn PaymentRepo>,
        users: Arc<dyn UserRepo>,
        store: Arc<dyn CompletionStore>,
        crypto_gateway: Arc<dyn PaymentGatewayPort>,
        access: Arc<dyn ChannelAccessPort>,
        notifier: Arc<dyn NotifierPort>,
        stars_refunder: Option<Arc<dyn RefundPort>>,
        catalog: PlanCatalog,
        channel_id: i64,
        webhook_secret: SecretString,
        poll_call_delay: std::time::Duration,
    ) -> Self {
        Self {
            payments,
            users,
            store,
            crypto_gateway,
            access,
            notifier,
            stars_refunder,
            catalog,
            channel_id,
            webhook_secret,
            poll_call_delay,
            recent_refs: RecentRefs::new(RECENT_REFS_CAP),
        }
    }

    // ========================================================================
    // Webhook path
    // ========================================================================

    /// Handle a raw webhook delivery. The signature is verified over the raw
    /// bytes before anything is parsed; a mismatch changes no state.
    pub async fn handle_webhook(&self, signature: &str, raw: &[u8]) -> AppResult<WebhookOutcome> {
        verify_signature(&self.webhook_secret, signature, raw)?;

        let event: InvoiceWebhookEvent = serde_json::from_slice(raw)
            .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

        let Some(payment) = self.payments.get_by_invoice_payload(&event.order_id).await? else {
            warn!(order_id = %event.order_id, "Webhook for unknown order, ignoring");
            return Ok(WebhookOutcome::UnknownOrder);
        };

        if payment.status.is_terminal() {
            debug!(payment_id = %payment.id, status = %payment.status, "Webhook replay for settled payment");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        match provider_status_kind(&event.status) {
            StatusKind::Success => {
                // Tolerance check when both sides state an amount.
                if let (Some(expected), Some(paid)) = (
                    payment.expected_amount,
                    event.amount.and_then(Decimal::from_f64_retain),
                ) && !amount_matches(expected, paid)
                {
                    warn!(
                        payment_id = %payment.id,
                        %expected,
                        %paid,
                        "Webhook amount outside tolerance, leaving payment pending"
                    );
                    return Ok(WebhookOutcome::NoChange);
                }

                let charge_id = event
                    .charge_id
                    .clone()
                    .unwrap_or_else(|| format!("inv_{}", event.order_id));
                let confirmation = Confirmation {
                    external_ref: ExternalRef::ChargeId(charge_id),
                    paid_amount: event.amount.and_then(Decimal::from_f64_retain),
                    observed_at: event
                        .paid_at
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                };

                match self.complete(&payment, &confirmation).await? {
                    CompletionOutcome::Completed { .. } => Ok(WebhookOutcome::Completed),
                    CompletionOutcome::AlreadyProcessed | CompletionOutcome::NotPending => {
                        Ok(WebhookOutcome::AlreadyProcessed)
                    }
                    CompletionOutcome::NotFound => Ok(WebhookOutcome::UnknownOrder),
                }
            }
            StatusKind::Failure => {
                self.payments.mark_failed(payment.id).await?;
                info!(payment_id = %payment.id, status = %event.status, "Payment failed at provider");
                Ok(WebhookOutcome::MarkedFailed)
            }
            StatusKind::Pending => {
                debug!(payment_id = %payment.id, status = %event.status, "Non-terminal webhook status");
                Ok(WebhookOutcome::NoChange)
            }
        }
    }

    // ========================================================================
    // Poll/sweep path
    // ========================================================================

    /// Poll every pending crypto payment that has not expired. One payment's
    /// error is logged and the sweep continues; outbound calls are spaced by
    /// the configured delay to respect provider quotas.
    pub async fn poll_pending(&self) -> SweepStats {
        let now = Utc::now();
        let pending = match self.payments.list_pending_polled(now).await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to list pending payments for sweep");
                return SweepStats::default();
            }
        };

        let mut stats = SweepStats {
            scanned: pending.len(),
            ..SweepStats::default()
        };

        let mut first = true;
        for payment in pending {
            if !first {
                tokio::time::sleep(self.poll_call_delay).await;
            }
            first = false;

            if payment.payment_method != self.crypto_gateway.method() {
                warn!(
                    payment_id = %payment.id,
                    method = %payment.payment_method,
                    "Pending payment for a method this deployment does not monitor"
                );
                continue;
            }

            match self.poll_one(&payment).await {
                Ok(PollResult::Completed) => stats.completed += 1,
                Ok(PollResult::Failed) => stats.failed += 1,
                Ok(PollResult::StillPending) => {}
                Err(e) => {
                    stats.errors += 1;
                    // Retryable or not, the payment stays pending; the next
                    // sweep will pick it up again.
                    warn!(payment_id = %payment.id, error = %e, "Poll failed for payment");
                }
            }
        }

        if stats.scanned > 0 {
            info!(
                scanned = stats.scanned,
                completed = stats.completed,
                failed = stats.failed,
                errors = stats.errors,
                "Reconciliation sweep finished"
            );
        }
        stats
    }

    async fn poll_one(&self, payment: &Payment) -> AppResult<PollResult> {
        match self.crypto_gateway.poll(payment).await? {
            PollOutcome::Confirmed(confirmation) => {
                match self.complete(payment, &confirmation).await? {
                    CompletionOutcome::Completed { .. } => Ok(PollResult::Completed),
                    _ => Ok(PollResult::StillPending),
                }
            }
            PollOutcome::Failed { provider_status } => {
                info!(payment_id = %payment.id, %provider_status, "Provider reports terminal failure");
                self.payments.mark_failed(payment.id).await?;
                Ok(PollResult::Failed)
            }
            PollOutcome::Pending { status_label } => {
                if let Some(label) = status_label {
                    debug!(payment_id = %payment.id, %label, "Payment still pending at provider");
                }
                Ok(PollResult::StillPending)
            }
        }
    }

    // ========================================================================
    // Stars path
    // ========================================================================

    /// Entry for the bot's successful-payment update. Drives the same
    /// completion transaction as the crypto paths.
    pub async fn confirm_stars(
        &self,
        invoice_payload: &str,
        telegram_charge_id: &str,
    ) -> AppResult<CompletionOutcome> {
        if self.recent_refs.contains(telegram_charge_id) {
            debug!(charge_id = telegram_charge_id, "Duplicate Stars confirmation (cache hit)");
            return Ok(CompletionOutcome::AlreadyProcessed);
        }

        let Some(payment) = self.payments.get_by_invoice_payload(invoice_payload).await? else {
            warn!(invoice_payload, "Stars confirmation for unknown payload");
            return Ok(CompletionOutcome::NotFound);
        };

        let confirmation = Confirmation {
            external_ref: ExternalRef::TelegramChargeId(telegram_charge_id.to_string()),
            paid_amount: None,
            observed_at: None,
        };
        let outcome = self.complete(&payment, &confirmation).await?;

        if let (CompletionOutcome::Completed { payment, .. }, Some(refunder)) =
            (&outcome, &self.stars_refunder)
        {
            // Deployment-configured auto refund, best effort after commit.
            if let Ok(Some(user)) = self.users.get_user(payment.user_id).await
                && let Err(e) = refunder.refund(user.telegram_id, telegram_charge_id).await
            {
                warn!(payment_id = %payment.id, error = %e, "Auto-refund failed (non-critical)");
            }
        }

        Ok(outcome)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Drive the atomic completion transaction, then run best-effort side
    /// effects (channel grant, notification) outside of it.
    async fn complete(
        &self,
        payment: &Payment,
        confirmation: &Confirmation,
    ) -> AppResult<CompletionOutcome> {
        // Causality guard: an external event older than the payment can
        // never settle it, even on a perfect address/amount match.
        if let Some(observed_at) = confirmation.observed_at
            && observed_at < payment.created_at
        {
            warn!(
                payment_id = %payment.id,
                %observed_at,
                created_at = %payment.created_at,
                "Confirmation predates payment, refusing to complete"
            );
            return Ok(CompletionOutcome::NotPending);
        }

        if self.recent_refs.contains(confirmation.external_ref.as_str()) {
            debug!(
                external_ref = confirmation.external_ref.as_str(),
                "Duplicate confirmation (cache hit)"
            );
            return Ok(CompletionOutcome::AlreadyProcessed);
        }

        let duration = self
            .catalog
            .duration(payment.plan_type)
            .ok_or_else(|| AppError::UnknownPlan(payment.plan_type.to_string()))?;

        let outcome = self
            .store
            .complete_payment(
                payment.id,
                &confirmation.external_ref,
                self.channel_id,
                payment.plan_type,
                duration,
                Utc::now(),
            )
            .await?;

        match &outcome {
            CompletionOutcome::Completed { payment, subscription } => {
                self.recent_refs.insert(confirmation.external_ref.as_str());
                info!(
                    payment_id = %payment.id,
                    subscription_id = %subscription.id,
                    end_date = %subscription.end_date,
                    "Payment completed, subscription active"
                );
                self.grant_and_notify(payment, subscription).await;
            }
            CompletionOutcome::AlreadyProcessed => {
                debug!(payment_id = %payment.id, "Completion raced a duplicate, already processed");
            }
            CompletionOutcome::NotPending => {
                debug!(payment_id = %payment.id, "Completion skipped, payment not pending");
            }
            CompletionOutcome::NotFound => {
                warn!(payment_id = %payment.id, "Payment vanished before completion");
            }
        }

        Ok(outcome)
    }

    /// Post-commit side effects. Failures here are logged and must never
    /// mask the already-committed payment/subscription state.
    async fn grant_and_notify(&self, payment: &Payment, subscription: &Subscription) {
        let user = match self.users.get_user(payment.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                error!(payment_id = %payment.id, "Completed payment references missing user");
                return;
            }
            Err(e) => {
                error!(payment_id = %payment.id, error = %e, "User lookup failed after completion");
                return;
            }
        };

        match self.access.grant(self.channel_id, user.telegram_id).await {
            Ok(invite_link) => {
                let text = format!(
                    "Payment received! Your access runs until {}.\n{}",
                    subscription.end_date.format("%Y-%m-%d %H:%M UTC"),
                    invite_link
                );
                if let Err(e) = self.notifier.notify(user.telegram_id, &text).await {
                    warn!(telegram_id = user.telegram_id, error = %e, "Notification failed (non-critical)");
                }
            }
            Err(e) => {
                error!(
                    telegram_id = user.telegram_id,
                    error = %e,
                    "Channel grant failed after committed completion"
                );
            }
        }
    }
}

enum PollResult {
    Completed,
    Failed,
    StillPending,
}

enum StatusKind {
    Success,
    Failure,
    Pending,
}

/// Map a provider status string onto our terminal/non-terminal split. An
/// unrecognized status is still-pending, never a silent completion.
fn provider_status_kind(status: &str) -> StatusKind {
    match status.to_ascii_lowercase().as_str() {
        "paid" | "completed" | "confirmed" | "finished" | "overpaid" => StatusKind::Success,
        "failed" | "refunded" | "expired" | "canceled" | "cancelled" => StatusKind::Failure,
        _ => StatusKind::Pending,
    }
}
