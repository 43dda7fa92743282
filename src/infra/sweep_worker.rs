//! Background sweeps: reconciliation polling, payment expiry and
//! subscription expiry, all driven by one select loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::{
    application::use_cases::{expiry::ExpirySweeps, reconciliation::ReconciliationEngine},
    infra::config::AppConfig,
};

pub async fn run_sweep_loop(
    reconciliation: Arc<ReconciliationEngine>,
    expiry: Arc<ExpirySweeps>,
    config: Arc<AppConfig>,
) {
    let mut poll_ticker = interval(Duration::from_secs(config.poll_interval_secs));
    let mut payment_expiry_ticker =
        interval(Duration::from_secs(config.payment_expiry_interval_secs));
    let mut subscription_expiry_ticker =
        interval(Duration::from_secs(config.subscription_expiry_interval_secs));

    info!(
        poll_secs = config.poll_interval_secs,
        payment_expiry_secs = config.payment_expiry_interval_secs,
        subscription_expiry_secs = config.subscription_expiry_interval_secs,
        "Sweep worker started"
    );

    loop {
        tokio::select! {
            _ = poll_ticker.tick() => {
                reconciliation.poll_pending().await;
            }
            _ = payment_expiry_ticker.tick() => {
                if let Err(e) = expiry.expire_payments().await {
                    error!(error = %e, "Payment expiry sweep failed");
                }
            }
            _ = subscription_expiry_ticker.tick() => {
                expiry.expire_subscriptions().await;
            }
        }
    }
}
