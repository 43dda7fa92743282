//! Shared test doubles: an in-memory store implementing the repo and
//! completion-store contracts, scripted gateway mocks, and entity factories.

pub mod app_state;
pub mod factories;
pub mod gateway_mocks;
pub mod mocks;

pub use app_state::{test_app_state, TEST_WEBHOOK_SECRET};
pub use factories::{create_test_payment, test_catalog, test_user};
pub use gateway_mocks::MockGateway;
pub use mocks::{InMemoryStore, MockChannelAccess, MockNotifier, CHANNEL_ID};
