use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{subscription, PostgresPersistence},
    app_error::{is_unique_violation, AppError, AppResult},
    application::ports::payment_gateway::ExternalRef,
    application::use_cases::{
        extension::{self, ExtensionDecision},
        payments::{NewPayment, PaymentRepo},
        reconciliation::{CompletionOutcome, CompletionStore},
    },
    domain::entities::{
        payment::{Payment, PaymentStatus},
        plan::PlanType,
        subscription::Subscription,
    },
};

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Payment {
    Payment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        plan_type: row.get("plan_type"),
        payment_method: row.get("payment_method"),
        status: row.get("status"),
        invoice_payload: row.get("invoice_payload"),
        telegram_charge_id: row.get("telegram_charge_id"),
        crypto_address: row.get("crypto_address"),
        crypto_tx_hash: row.get("crypto_tx_hash"),
        expected_amount: row.get("expected_amount"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, amount, currency, plan_type, payment_method, status,
    invoice_payload, telegram_charge_id, crypto_address, crypto_tx_hash,
    expected_amount, expires_at, created_at, updated_at
"#;

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn create(&self, input: &NewPayment) -> AppResult<Payment> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments
                (id, user_id, amount, currency, plan_type, payment_method,
                 invoice_payload, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(input.user_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(input.plan_type)
        .bind(input.payment_method)
        .bind(&input.invoice_payload)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_payment(&row))
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {} FROM payments WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_payment))
    }

    async fn get_by_invoice_payload(&self, payload: &str) -> AppResult<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE invoice_payload = $1",
            SELECT_COLS
        ))
        .bind(payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_payment))
    }

    async fn set_intent_details(
        &self,
        id: Uuid,
        crypto_address: Option<&str>,
        expected_amount: Option<Decimal>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payments SET
                crypto_address = $2,
                expected_amount = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(crypto_address)
        .bind(expected_amount)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_pending_polled(&self, now: DateTime<Utc>) -> AppResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'pending'
              AND payment_method IN ('crypto_hosted_invoice', 'crypto_ledger_scan')
              AND expires_at >= $1
            ORDER BY created_at
            "#,
            SELECT_COLS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_payment).collect())
    }

    async fn mark_failed(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payments SET status = 'failed', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = 'expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'pending' AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected())
    }
}

/// Column the external reference lands in. `invoice_payload` is set at
/// creation; the completion-time references split by origin.
fn ref_column(external_ref: &ExternalRef) -> &'static str {
    match external_ref {
        ExternalRef::TelegramChargeId(_) => "telegram_charge_id",
        ExternalRef::TxHash(_) | ExternalRef::ChargeId(_) => "crypto_tx_hash",
    }
}

#[async_trait]
impl CompletionStore for PostgresPersistence {
    /// The completion transaction.
    ///
    /// Row locks serialize concurrent completions of the same payment, and
    /// the unique constraint on the reference column turns a duplicate
    /// confirmation into a rollback instead of a double grant.
    async fn complete_payment(
        &self,
        payment_id: Uuid,
        external_ref: &ExternalRef,
        channel_id: i64,
        plan: PlanType,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE id = $1 FOR UPDATE",
            SELECT_COLS
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let Some(row) = row else {
            return Ok(CompletionOutcome::NotFound);
        };
        let mut payment = row_to_payment(&row);

        if payment.status != PaymentStatus::Pending {
            // Idempotent when this exact reference already settled the row.
            let already = match external_ref {
                ExternalRef::TelegramChargeId(s) => {
                    payment.telegram_charge_id.as_deref() == Some(s)
                }
                ExternalRef::TxHash(s) | ExternalRef::ChargeId(s) => {
                    payment.crypto_tx_hash.as_deref() == Some(s)
                }
            };
            return Ok(if already {
                CompletionOutcome::AlreadyProcessed
            } else {
                CompletionOutcome::NotPending
            });
        }

        let update = sqlx::query(&format!(
            r#"
            UPDATE payments SET status = 'completed', {} = $2, updated_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
            ref_column(external_ref)
        ))
        .bind(payment_id)
        .bind(external_ref.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await;

        match update {
            Ok(result) if result.rows_affected() == 1 => {}
            Ok(_) => return Ok(CompletionOutcome::NotPending),
            Err(e) if is_unique_violation(&e) => {
                // The reference already settled another payment.
                tx.rollback().await.map_err(AppError::from)?;
                return Ok(CompletionOutcome::AlreadyProcessed);
            }
            Err(e) => return Err(e.into()),
        }
        payment.status = PaymentStatus::Completed;
        payment.updated_at = now;
        match external_ref {
            ExternalRef::TelegramChargeId(s) => payment.telegram_charge_id = Some(s.clone()),
            ExternalRef::TxHash(s) | ExternalRef::ChargeId(s) => {
                payment.crypto_tx_hash = Some(s.clone())
            }
        }

        // Lock the user's subscription rows so a concurrent completion for
        // the same user observes this one's extension.
        let sub_rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE user_id = $1 AND channel_id = $2 AND is_active = TRUE
            FOR UPDATE
            "#,
            subscription::SELECT_COLS
        ))
        .bind(payment.user_id)
        .bind(channel_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let active: Vec<Subscription> = sub_rows
            .iter()
            .map(subscription::row_to_subscription)
            .collect();

        let subscription = match extension::decide(&active, plan, duration, now) {
            ExtensionDecision::Extend {
                subscription_id,
                new_start,
                new_end,
                plan,
            } => {
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE subscriptions SET
                        start_date = $2, end_date = $3, plan_type = $4
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    subscription::SELECT_COLS
                ))
                .bind(subscription_id)
                .bind(new_start)
                .bind(new_end)
                .bind(plan)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                subscription::row_to_subscription(&row)
            }
            ExtensionDecision::Fresh { start, end, plan } => {
                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO subscriptions
                        (id, user_id, channel_id, plan_type, start_date, end_date,
                         is_active, payment_id)
                    VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
                    RETURNING {}
                    "#,
                    subscription::SELECT_COLS
                ))
                .bind(Uuid::new_v4())
                .bind(payment.user_id)
                .bind(channel_id)
                .bind(plan)
                .bind(start)
                .bind(end)
                .bind(payment.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                subscription::row_to_subscription(&row)
            }
        };

        tx.commit().await.map_err(AppError::from)?;

        Ok(CompletionOutcome::Completed {
            payment,
            subscription,
        })
    }
}
