use std::sync::Arc;

use crate::{
    application::use_cases::{
        expiry::ExpirySweeps, payments::PaymentUseCases, reconciliation::ReconciliationEngine,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub payment_use_cases: Arc<PaymentUseCases>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub expiry_sweeps: Arc<ExpirySweeps>,
}
