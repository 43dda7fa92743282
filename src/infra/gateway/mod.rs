pub mod hosted_invoice;
pub mod ledger_scan;
pub mod stars;
