use serde::Serialize;
use sqlx::FromRow;

/// Committed ledger entry
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerEntry {
    pub seq: i64,
    pub digest: String,
    pub signer_address: String,
    pub signature: String,
    pub previous_digest: String,
    pub original_name: String,
    pub size: i64,
    pub commit_ref: String,
    pub timestamp: String,
}

/// Entry handed to a backend for appending
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub digest: String,
    pub signer_address: String,
    pub signature: String,
    pub previous_digest: String,
    pub original_name: String,
    pub size: i64,
}

/// Reference returned once a backend has committed an entry
#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub commit_ref: String,
    pub timestamp: String,
}

/// Result of a queued registration
#[derive(Debug, Clone, Serialize)]
pub struct NotarizationReceipt {
    pub digest: String,
    pub tx_hash: String,
    pub signature: String,
    pub previous_hash: String,
    pub signer: String,
    pub timestamp: String,
}

/// Ledger read-model row
#[derive(Debug, Clone, Serialize)]
pub struct LedgerFileItem {
    pub uploader: String,
    pub file_hash: String,
    pub file_name: String,
    pub file_size: i64,
    pub timestamp: String,
    pub tx_hash: String,
    pub previous_hash: String,
}

impl From<LedgerEntry> for LedgerFileItem {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            uploader: entry.signer_address,
            file_hash: entry.digest,
            file_name: entry.original_name,
            file_size: entry.size,
            timestamp: entry.timestamp,
            tx_hash: entry.commit_ref,
            previous_hash: entry.previous_digest,
        }
    }
}

/// Outcome of walking one signer's chain
#[derive(Debug, Clone, Serialize)]
pub struct ChainAudit {
    pub signer: String,
    pub length: usize,
    pub head: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}
