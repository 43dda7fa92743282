//! Hosted-invoice PSP gateway. The provider hosts the checkout page and
//! reports status both by signed webhook and on demand through the status
//! endpoint this adapter polls.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        Confirmation, ExternalRef, PayTarget, PaymentGatewayPort, PollOutcome, ProviderIntent,
    },
    domain::entities::{
        payment::{Payment, PaymentMethod},
        plan::PlanPrice,
    },
};

const HTTP_TIMEOUT_SECS: u64 = 10;

pub struct HostedInvoiceGateway {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct InvoiceCreated {
    invoice_url: String,
    pay_amount: String,
    pay_currency: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceStatus {
    status: String,
    charge_id: Option<String>,
    paid_amount: Option<String>,
    /// Unix seconds of the provider-side settlement.
    paid_at: Option<i64>,
}

impl HostedInvoiceGateway {
    pub fn new(base_url: String, api_key: SecretString) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            api_key,
        }
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(%status, body = %body, "Invoice provider API error");
            return Err(match status.as_u16() {
                429 => AppError::ProviderRateLimited,
                500..=599 => AppError::ProviderUnavailable(format!("provider returned {}", status)),
                _ => AppError::ProviderRejected(format!("{} - {}", status, body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse provider response");
            AppError::ProviderUnavailable(format!("Failed to parse provider response: {}", e))
        })
    }
}

#[async_trait]
impl PaymentGatewayPort for HostedInvoiceGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::CryptoHostedInvoice
    }

    async fn create_intent(
        &self,
        order_id: &str,
        price: &PlanPrice,
        description: &str,
    ) -> AppResult<ProviderIntent> {
        let response = self
            .client
            .post(format!("{}/invoices", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "order_id": order_id,
                "amount": price.amount.to_string(),
                "currency": price.currency,
                "description": description,
            }))
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Provider request failed: {}", e)))?;

        let created: InvoiceCreated = self.handle_response(response).await?;
        let pay_amount = Decimal::from_str(&created.pay_amount).map_err(|_| {
            AppError::ProviderRejected(format!("Invalid invoice amount: {}", created.pay_amount))
        })?;

        Ok(ProviderIntent {
            provider_reference: order_id.to_string(),
            pay_target: PayTarget::InvoiceUrl(created.invoice_url),
            pay_amount,
            pay_currency: created.pay_currency,
        })
    }

    async fn poll(&self, payment: &Payment) -> AppResult<PollOutcome> {
        let order_id = payment
            .invoice_payload
            .as_deref()
            .ok_or_else(|| AppError::InvalidInput("Payment has no order reference".into()))?;

        let response = self
            .client
            .get(format!("{}/invoices/{}", self.base_url, order_id))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Provider request failed: {}", e)))?;

        let invoice: InvoiceStatus = self.handle_response(response).await?;
        Ok(map_invoice_status(order_id, invoice))
    }
}

/// Map a provider invoice status onto a poll outcome. Anything not in the
/// known terminal sets stays pending.
fn map_invoice_status(order_id: &str, invoice: InvoiceStatus) -> PollOutcome {
    match invoice.status.to_ascii_lowercase().as_str() {
        "paid" | "completed" | "confirmed" | "finished" | "overpaid" => {
            let charge_id = invoice
                .charge_id
                .unwrap_or_else(|| format!("inv_{}", order_id));
            PollOutcome::Confirmed(Confirmation {
                external_ref: ExternalRef::ChargeId(charge_id),
                paid_amount: invoice
                    .paid_amount
                    .as_deref()
                    .and_then(|s| Decimal::from_str(s).ok()),
                observed_at: invoice
                    .paid_at
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            })
        }
        "failed" | "refunded" | "expired" | "canceled" | "cancelled" => PollOutcome::Failed {
            provider_status: invoice.status,
        },
        _ => PollOutcome::Pending {
            status_label: Some(invoice.status),
        },
    }
}
