//! Ledger-scan gateway. No hosted checkout: the user transfers directly to
//! the service wallet, and polling scans the explorer's transaction list for
//! a transfer that matches the pending payment.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        Confirmation, ExternalRef, PayTarget, PaymentGatewayPort, PollOutcome, ProviderIntent,
    },
    application::use_cases::reconciliation::{find_matching_tx, LedgerTx},
    domain::entities::{
        payment::{Payment, PaymentMethod},
        plan::PlanPrice,
    },
};

const HTTP_TIMEOUT_SECS: u64 = 10;
/// Explorer page size. Matching only needs transactions newer than the
/// intent, which a pending payment's lifetime keeps well within one page.
const TX_PAGE_LIMIT: u32 = 100;

pub struct LedgerScanGateway {
    client: Client,
    base_url: String,
    wallet_address: String,
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    transactions: Vec<ExplorerTx>,
}

#[derive(Debug, Deserialize)]
struct ExplorerTx {
    hash: String,
    to: String,
    /// Decimal string in the asset's display unit.
    amount: String,
    /// Unix seconds.
    utime: i64,
}

impl LedgerScanGateway {
    pub fn new(base_url: String, wallet_address: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            wallet_address,
        }
    }
}

fn to_ledger_tx(tx: &ExplorerTx) -> Option<LedgerTx> {
    let amount = Decimal::from_str(&tx.amount).ok()?;
    let timestamp = DateTime::<Utc>::from_timestamp(tx.utime, 0)?;
    Some(LedgerTx {
        tx_hash: tx.hash.clone(),
        to_address: tx.to.clone(),
        amount,
        timestamp,
    })
}

#[async_trait]
impl PaymentGatewayPort for LedgerScanGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::CryptoLedgerScan
    }

    async fn create_intent(
        &self,
        order_id: &str,
        price: &PlanPrice,
        _description: &str,
    ) -> AppResult<ProviderIntent> {
        // Nothing to create provider-side; the wallet address is the intent.
        Ok(ProviderIntent {
            provider_reference: order_id.to_string(),
            pay_target: PayTarget::Address(self.wallet_address.clone()),
            pay_amount: price.amount,
            pay_currency: price.currency.clone(),
        })
    }

    async fn poll(&self, payment: &Payment) -> AppResult<PollOutcome> {
        let address = payment
            .crypto_address
            .as_deref()
            .unwrap_or(&self.wallet_address);

        let limit = TX_PAGE_LIMIT.to_string();
        let response = self
            .client
            .get(format!("{}/transactions", self.base_url))
            .query(&[("address", address), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Explorer request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                429 => AppError::ProviderRateLimited,
                _ => AppError::ProviderUnavailable(format!("explorer returned {}", status)),
            });
        }

        let list: TxListResponse = response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("Failed to parse explorer response: {}", e))
        })?;

        let txs: Vec<LedgerTx> = list.transactions.iter().filter_map(to_ledger_tx).collect();
        match find_matching_tx(payment, &txs) {
            Some(tx) => Ok(PollOutcome::Confirmed(Confirmation {
                external_ref: ExternalRef::TxHash(tx.tx_hash.clone()),
                paid_amount: Some(tx.amount),
                observed_at: Some(tx.timestamp),
            })),
            // A ledger never reports terminal failure; the intent deadline
            // is the only thing that ends the wait.
            None => Ok(PollOutcome::Pending { status_label: None }),
        }
    }
}
