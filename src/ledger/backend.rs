use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CommitReceipt, LedgerEntry, NewLedgerEntry};

/// Append-only store the integrity ledger commits to
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Whether an entry for this digest has been committed
    async fn is_registered(&self, digest: &str) -> Result<bool>;

    /// Digest of the signer's most recent entry, if any
    async fn latest_digest(&self, signer: &str) -> Result<Option<String>>;

    /// Append a new entry. A digest that is already present is rejected
    /// with `AlreadyRegistered`, never overwritten.
    async fn append(&self, entry: NewLedgerEntry) -> Result<CommitReceipt>;

    /// Every committed entry in commit order
    async fn entries(&self) -> Result<Vec<LedgerEntry>>;

    /// One signer's entries in commit order
    async fn entries_for(&self, signer: &str) -> Result<Vec<LedgerEntry>>;

    /// Get the backend type name
    fn backend_type(&self) -> &'static str;
}
