use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::HeaderValue;
use chrono::Duration;
use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::domain::entities::plan::{PlanCatalog, PlanPrice, PlanSpec, PlanType};

fn get_env<T: FromStr>(name: &str) -> T {
    let raw = std::env::var(name).unwrap_or_else(|_| panic!("{} must be set", name));
    raw.parse()
        .unwrap_or_else(|_| panic!("{} has an invalid value", name))
}

fn get_env_default<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} has an invalid value", name)),
        Err(_) => default,
    }
}

/// Which crypto monitoring strategy this deployment runs. Exactly one is
/// active per deployment; the other method is rejected at intent creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMonitor {
    HostedInvoice,
    LedgerScan,
}

impl FromStr for CryptoMonitor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hosted_invoice" => Ok(CryptoMonitor::HostedInvoice),
            "ledger_scan" => Ok(CryptoMonitor::LedgerScan),
            other => Err(format!("Invalid crypto monitor: {}", other)),
        }
    }
}

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,

    pub bot_token: SecretString,
    /// The private channel payments grant access to.
    pub channel_id: i64,

    pub webhook_secret: SecretString,
    pub crypto_monitor: CryptoMonitor,
    /// Hosted-invoice PSP endpoint and credentials.
    pub psp_api_url: String,
    pub psp_api_key: SecretString,
    /// Ledger explorer endpoint and the receiving wallet.
    pub explorer_api_url: String,
    pub wallet_address: String,
    pub crypto_currency: String,

    /// Refund Stars payments right after completion (promo deployments).
    pub stars_auto_refund: bool,

    pub intent_ttl: Duration,
    pub poll_interval_secs: u64,
    pub poll_call_delay_ms: u64,
    pub payment_expiry_interval_secs: u64,
    pub subscription_expiry_interval_secs: u64,

    pub plan_catalog: PlanCatalog,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:8080".parse().unwrap());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let bot_token = SecretString::new(get_env::<String>("TELEGRAM_BOT_TOKEN").into());
        let channel_id: i64 = get_env("CHANNEL_ID");

        let webhook_secret = SecretString::new(get_env::<String>("WEBHOOK_SECRET").into());
        let crypto_monitor: CryptoMonitor =
            get_env_default("CRYPTO_MONITOR", CryptoMonitor::HostedInvoice);
        let psp_api_url: String =
            get_env_default("PSP_API_URL", "https://api.psp.example".to_string());
        let psp_api_key = SecretString::new(
            std::env::var("PSP_API_KEY").unwrap_or_default().into(),
        );
        let explorer_api_url: String = get_env_default(
            "EXPLORER_API_URL",
            "https://toncenter.com/api/v2".to_string(),
        );
        let wallet_address: String = get_env_default("WALLET_ADDRESS", String::new());
        let crypto_currency: String = get_env_default("CRYPTO_CURRENCY", "TON".to_string());

        let stars_auto_refund: bool = get_env_default("STARS_AUTO_REFUND", false);

        let intent_ttl_minutes: i64 = get_env_default("INTENT_TTL_MINUTES", 60);
        let poll_interval_secs: u64 = get_env_default("POLL_INTERVAL_SECS", 30);
        let poll_call_delay_ms: u64 = get_env_default("POLL_CALL_DELAY_MS", 500);
        let payment_expiry_interval_secs: u64 =
            get_env_default("PAYMENT_EXPIRY_INTERVAL_SECS", 60);
        let subscription_expiry_interval_secs: u64 =
            get_env_default("SUBSCRIPTION_EXPIRY_INTERVAL_SECS", 300);

        Self {
            database_url,
            bind_addr,
            cors_origin,
            bot_token,
            channel_id,
            webhook_secret,
            crypto_monitor,
            psp_api_url,
            psp_api_key,
            explorer_api_url,
            wallet_address,
            crypto_currency: crypto_currency.clone(),
            stars_auto_refund,
            intent_ttl: Duration::minutes(intent_ttl_minutes),
            poll_interval_secs,
            poll_call_delay_ms,
            payment_expiry_interval_secs,
            subscription_expiry_interval_secs,
            plan_catalog: plan_catalog_from_env(&crypto_currency),
        }
    }
}

/// Plan prices and durations, overridable per deployment.
fn plan_catalog_from_env(crypto_currency: &str) -> PlanCatalog {
    let mut plans = HashMap::new();
    for (plan, duration_days, stars, crypto) in [
        (PlanType::Day, 1, "50", "10"),
        (PlanType::Week, 7, "250", "60"),
        (PlanType::Month, 30, "800", "200"),
    ] {
        let prefix = format!("PLAN_{}", plan.as_ref().to_uppercase());
        let duration_days: i64 =
            get_env_default(&format!("{}_DURATION_DAYS", prefix), duration_days);
        let stars_amount: Decimal = get_env_default(
            &format!("{}_STARS", prefix),
            stars.parse().expect("default stars price"),
        );
        let crypto_amount: Decimal = get_env_default(
            &format!("{}_CRYPTO", prefix),
            crypto.parse().expect("default crypto price"),
        );
        plans.insert(
            plan,
            PlanSpec {
                duration: Duration::days(duration_days),
                stars: PlanPrice {
                    amount: stars_amount,
                    currency: "XTR".to_string(),
                },
                crypto: PlanPrice {
                    amount: crypto_amount,
                    currency: crypto_currency.to_string(),
                },
            },
        );
    }
    PlanCatalog::new(plans)
}
