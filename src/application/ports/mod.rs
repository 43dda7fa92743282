pub mod channel_access;
pub mod notifier;
pub mod payment_gateway;
