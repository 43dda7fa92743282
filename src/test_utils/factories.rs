use std::collections::HashMap;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::{
    application::use_cases::payments::UserRepo,
    domain::entities::{
        payment::{Payment, PaymentMethod, PaymentStatus},
        plan::{PlanCatalog, PlanPrice, PlanSpec, PlanType},
        user::User,
    },
    test_utils::mocks::InMemoryStore,
};

/// Full three-tier catalog with the default deployment prices.
pub fn test_catalog() -> PlanCatalog {
    let mut plans = HashMap::new();
    plans.insert(
        PlanType::Day,
        PlanSpec {
            duration: Duration::days(1),
            stars: PlanPrice {
                amount: dec!(50),
                currency: "XTR".into(),
            },
            crypto: PlanPrice {
                amount: dec!(10),
                currency: "TON".into(),
            },
        },
    );
    plans.insert(
        PlanType::Week,
        PlanSpec {
            duration: Duration::days(7),
            stars: PlanPrice {
                amount: dec!(250),
                currency: "XTR".into(),
            },
            crypto: PlanPrice {
                amount: dec!(60),
                currency: "TON".into(),
            },
        },
    );
    plans.insert(
        PlanType::Month,
        PlanSpec {
            duration: Duration::days(30),
            stars: PlanPrice {
                amount: dec!(800),
                currency: "XTR".into(),
            },
            crypto: PlanPrice {
                amount: dec!(200),
                currency: "TON".into(),
            },
        },
    );
    PlanCatalog::new(plans)
}

/// Upsert a default user into the store.
pub async fn test_user(store: &InMemoryStore) -> User {
    store
        .upsert_telegram_user(123_456_789, "Test", Some("User"), Some("testuser"))
        .await
        .expect("test user upsert")
}

/// Pending week-plan ledger payment with overridable fields.
pub fn create_test_payment(overrides: impl FnOnce(&mut Payment)) -> Payment {
    let now = Utc::now();
    let mut payment = Payment {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        amount: dec!(60),
        currency: "TON".into(),
        plan_type: PlanType::Week,
        payment_method: PaymentMethod::CryptoLedgerScan,
        status: PaymentStatus::Pending,
        invoice_payload: Some(format!("ord_{}", Uuid::new_v4().simple())),
        telegram_charge_id: None,
        crypto_address: None,
        crypto_tx_hash: None,
        expected_amount: None,
        expires_at: now + Duration::hours(1),
        created_at: now,
        updated_at: now,
    };
    overrides(&mut payment);
    payment
}
