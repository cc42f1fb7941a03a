pub mod file;
pub mod ledger;
pub mod owner;

pub use file::*;
pub use ledger::*;
pub use owner::*;
