use async_trait::async_trait;
use rust_decimal::Decimal;

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

enum IntentBehavior {
    Url(String),
    Address(String),
    Fail,
}

enum PollBehavior {
    AlwaysPending,
    Confirm { charge_id: String, amount: Decimal },
    FailStatus(String),
    /// Error for every payment except the one with the given order id.
    ErrorExcept {
        invoice_payload: String,
        charge_id: String,
        amount: Decimal,
    },
}

/// Scripted payment gateway.
pub struct MockGateway {
    method: PaymentMethod,
    intent: IntentBehavior,
    poll: PollBehavior,
}

impl MockGateway {
    pub fn stars() -> Self {
        Self {
            method: PaymentMethod::TelegramStars,
            intent: IntentBehavior::Url("https://t.me/invoice/test".into()),
            poll: PollBehavior::AlwaysPending,
        }
    }

    pub fn ledger_with_address(address: &str) -> Self {
        Self {
            method: PaymentMethod::CryptoLedgerScan,
            intent: IntentBehavior::Address(address.into()),
            poll: PollBehavior::AlwaysPending,
        }
    }

    pub fn hosted_with_url(url: &str) -> Self {
        Self {
            method: PaymentMethod::CryptoHostedInvoice,
            intent: IntentBehavior::Url(url.into()),
            poll: PollBehavior::AlwaysPending,
        }
    }

    pub fn failing_intent(method: PaymentMethod) -> Self {
        Self {
            method,
            intent: IntentBehavior::Fail,
            poll: PollBehavior::AlwaysPending,
        }
    }

    /// Hosted gateway whose poll confirms every payment.
    pub fn hosted_confirming(charge_id: &str, amount: Decimal) -> Self {
        Self {
            method: PaymentMethod::CryptoHostedInvoice,
            intent: IntentBehavior::Url("https://psp.example/i/test".into()),
            poll: PollBehavior::Confirm {
                charge_id: charge_id.into(),
                amount,
            },
        }
    }

    /// Hosted gateway whose poll reports a terminal provider failure.
    pub fn hosted_failing_status(status: &str) -> Self {
        Self {
            method: PaymentMethod::CryptoHostedInvoice,
            intent: IntentBehavior::Url("https://psp.example/i/test".into()),
            poll: PollBehavior::FailStatus(status.into()),
        }
    }

    /// Hosted gateway that errors on every poll except for the payment with
    /// the given order id, which it confirms.
    pub fn hosted_erroring_except(invoice_payload: &str, charge_id: &str, amount: Decimal) -> Self {
        Self {
            method: PaymentMethod::CryptoHostedInvoice,
            intent: IntentBehavior::Url("https://psp.example/i/test".into()),
            poll: PollBehavior::ErrorExcept {
                invoice_payload: invoice_payload.into(),
                charge_id: charge_id.into(),
                amount,
            },
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for MockGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_intent(
        &self,
        order_id: &str,
        price: &PlanPrice,
        _description: &str,
    ) -> AppResult<ProviderIntent> {
        let pay_target = match &self.intent {
            IntentBehavior::Url(url) => PayTarget::InvoiceUrl(url.clone()),
            IntentBehavior::Address(addr) => PayTarget::Address(addr.clone()),
            IntentBehavior::Fail => {
                return Err(AppError::ProviderUnavailable("intent creation failed".into()));
            }
        };
        Ok(ProviderIntent {
            provider_reference: format!("prov_{}", order_id),
            pay_target,
            pay_amount: price.amount,
            pay_currency: price.currency.clone(),
        })
    }

    async fn poll(&self, payment: &Payment) -> AppResult<PollOutcome> {
        match &self.poll {
            PollBehavior::AlwaysPending => Ok(PollOutcome::Pending { status_label: None }),
            PollBehavior::Confirm { charge_id, amount } => {
                Ok(PollOutcome::Confirmed(Confirmation {
                    external_ref: ExternalRef::ChargeId(charge_id.clone()),
                    paid_amount: Some(*amount),
                    observed_at: None,
                }))
            }
            PollBehavior::FailStatus(status) => Ok(PollOutcome::Failed {
                provider_status: status.clone(),
            }),
            PollBehavior::ErrorExcept {
                invoice_payload,
                charge_id,
                amount,
            } => {
                if payment.invoice_payload.as_deref() == Some(invoice_payload) {
                    Ok(PollOutcome::Confirmed(Confirmation {
                        external_ref: ExternalRef::ChargeId(charge_id.clone()),
                        paid_amount: Some(*amount),
                        observed_at: None,
                    }))
                } else {
                    Err(AppError::ProviderUnavailable("explorer timeout".into()))
                }
            }
        }
    }
}
