pub mod expiry;
pub mod extension;
pub mod payments;
pub mod reconciliation;
