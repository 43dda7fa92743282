use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::Duration;
use secrecy::SecretString;

use crate::{
    adapters::http::app_state::AppState,
    application::ports::payment_gateway::PaymentGatewayPort,
    application::use_cases::{
        expiry::ExpirySweeps, payments::PaymentUseCases, reconciliation::ReconciliationEngine,
    },
    infra::config::{AppConfig, CryptoMonitor},
    test_utils::{
        factories::test_catalog,
        gateway_mocks::MockGateway,
        mocks::{InMemoryStore, MockChannelAccess, MockNotifier, CHANNEL_ID},
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/test".into(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        bot_token: SecretString::new("test-bot-token".into()),
        channel_id: CHANNEL_ID,
        webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
        crypto_monitor: CryptoMonitor::HostedInvoice,
        psp_api_url: "https://psp.example".into(),
        psp_api_key: SecretString::new("test-psp-key".into()),
        explorer_api_url: "https://explorer.example".into(),
        wallet_address: "addr-1".into(),
        crypto_currency: "TON".into(),
        stars_auto_refund: false,
        intent_ttl: Duration::hours(1),
        poll_interval_secs: 30,
        poll_call_delay_ms: 0,
        payment_expiry_interval_secs: 60,
        subscription_expiry_interval_secs: 300,
        plan_catalog: test_catalog(),
    }
}

/// Full app state over an in-memory store, with a hosted-invoice gateway
/// and recording access/notifier mocks.
pub fn test_app_state(store: Arc<InMemoryStore>) -> AppState {
    let crypto: Arc<dyn PaymentGatewayPort> =
        Arc::new(MockGateway::hosted_with_url("https://psp.example/i/1"));
    let access = Arc::new(MockChannelAccess::default());
    let notifier = Arc::new(MockNotifier::default());

    let payment_use_cases = PaymentUseCases::new(
        store.clone(),
        store.clone(),
        Arc::new(MockGateway::stars()),
        crypto.clone(),
        test_catalog(),
        Duration::hours(1),
    );

    let reconciliation = ReconciliationEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        crypto,
        access.clone(),
        notifier.clone(),
        None,
        test_catalog(),
        CHANNEL_ID,
        SecretString::new(TEST_WEBHOOK_SECRET.into()),
        std::time::Duration::from_millis(0),
    );

    let expiry_sweeps = ExpirySweeps::new(
        store.clone(),
        store.clone(),
        store,
        access,
        notifier,
    );

    AppState {
        config: Arc::new(test_config()),
        payment_use_cases: Arc::new(payment_use_cases),
        reconciliation: Arc::new(reconciliation),
        expiry_sweeps: Arc::new(expiry_sweeps),
    }
}
