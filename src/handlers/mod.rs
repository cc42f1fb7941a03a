pub mod file;
pub mod ledger;
