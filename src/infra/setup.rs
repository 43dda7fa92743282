use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{
        http::app_state::AppState, persistence::PostgresPersistence, telegram::TelegramApi,
    },
    application::ports::{
        channel_access::ChannelAccessPort, notifier::NotifierPort,
        payment_gateway::PaymentGatewayPort,
    },
    application::use_cases::{
        expiry::{ExpirySweeps, SubscriptionRepo},
        payments::{PaymentRepo, PaymentUseCases, UserRepo},
        reconciliation::{CompletionStore, ReconciliationEngine, RefundPort},
    },
    infra::{
        config::{AppConfig, CryptoMonitor},
        db::init_db,
        gateway::{
            hosted_invoice::HostedInvoiceGateway, ledger_scan::LedgerScanGateway,
            stars::StarsGateway,
        },
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let pool = init_db(&config.database_url).await?;
    let persistence = Arc::new(PostgresPersistence::new(pool));

    let telegram = Arc::new(TelegramApi::new(config.bot_token.clone()));

    let stars_gateway: Arc<dyn PaymentGatewayPort> = Arc::new(StarsGateway::new(telegram.clone()));
    let crypto_gateway: Arc<dyn PaymentGatewayPort> = match config.crypto_monitor {
        CryptoMonitor::HostedInvoice => Arc::new(HostedInvoiceGateway::new(
            config.psp_api_url.clone(),
            config.psp_api_key.clone(),
        )),
        CryptoMonitor::LedgerScan => Arc::new(LedgerScanGateway::new(
            config.explorer_api_url.clone(),
            config.wallet_address.clone(),
        )),
    };

    let users = persistence.clone() as Arc<dyn UserRepo>;
    let payments = persistence.clone() as Arc<dyn PaymentRepo>;
    let subscriptions = persistence.clone() as Arc<dyn SubscriptionRepo>;
    let completion_store = persistence.clone() as Arc<dyn CompletionStore>;
    let access = telegram.clone() as Arc<dyn ChannelAccessPort>;
    let notifier = telegram.clone() as Arc<dyn NotifierPort>;
    let stars_refunder = config
        .stars_auto_refund
        .then(|| telegram.clone() as Arc<dyn RefundPort>);

    let payment_use_cases = PaymentUseCases::new(
        users.clone(),
        payments.clone(),
        stars_gateway,
        crypto_gateway.clone(),
        config.plan_catalog.clone(),
        config.intent_ttl,
    );

    let reconciliation = ReconciliationEngine::new(
        payments.clone(),
        users.clone(),
        completion_store,
        crypto_gateway,
        access.clone(),
        notifier.clone(),
        stars_refunder,
        config.plan_catalog.clone(),
        config.channel_id,
        config.webhook_secret.clone(),
        std::time::Duration::from_millis(config.poll_call_delay_ms),
    );

    let expiry_sweeps = ExpirySweeps::new(payments, subscriptions, users, access, notifier);

    Ok(AppState {
        config: Arc::new(config),
        payment_use_cases: Arc::new(payment_use_cases),
        reconciliation: Arc::new(reconciliation),
        expiry_sweeps: Arc::new(expiry_sweeps),
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "channelpass=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
