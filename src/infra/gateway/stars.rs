//! Telegram Stars gateway. Intent creation is an invoice link; confirmation
//! arrives through the bot's successful-payment update, never by polling.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

use crate::{
    adapters::telegram::TelegramApi,
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        PayTarget, PaymentGatewayPort, PollOutcome, ProviderIntent,
    },
    domain::entities::{
        payment::{Payment, PaymentMethod},
        plan::PlanPrice,
    },
};

pub struct StarsGateway {
    telegram: Arc<TelegramApi>,
}

impl StarsGateway {
    pub fn new(telegram: Arc<TelegramApi>) -> Self {
        Self { telegram }
    }
}

#[async_trait]
impl PaymentGatewayPort for StarsGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::TelegramStars
    }

    async fn create_intent(
        &self,
        order_id: &str,
        price: &PlanPrice,
        description: &str,
    ) -> AppResult<ProviderIntent> {
        // Stars prices are whole numbers of XTR.
        let stars_amount = price
            .amount
            .to_i64()
            .filter(|_| price.amount.fract().is_zero())
            .ok_or_else(|| {
                AppError::InvalidInput(format!("Stars price must be integral: {}", price.amount))
            })?;

        let invoice_url = self
            .telegram
            .create_invoice_link("Channel access", description, order_id, stars_amount)
            .await?;

        Ok(ProviderIntent {
            provider_reference: order_id.to_string(),
            pay_target: PayTarget::InvoiceUrl(invoice_url),
            pay_amount: price.amount,
            pay_currency: price.currency.clone(),
        })
    }

    async fn poll(&self, _payment: &Payment) -> AppResult<PollOutcome> {
        Ok(PollOutcome::Pending { status_label: None })
    }
}
