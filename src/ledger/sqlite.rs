use async_trait::async_trait;
use chrono::Utc;

use crate::db::{format_timestamp, Database};
use crate::error::{AppError, Result};
use crate::ledger::LedgerBackend;
use crate::models::{CommitReceipt, LedgerEntry, NewLedgerEntry};
use crate::services::hasher::ContentHasher;

/// Ledger backend over the `ledger_entries` table.
/// Triggers installed by the migrations reject UPDATE and DELETE.
pub struct SqliteLedger {
    db: Database,
}

impl SqliteLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn unavailable(e: sqlx::Error) -> AppError {
    AppError::LedgerUnavailable(e.to_string())
}

fn is_digest_conflict(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err
            .message()
            .contains("UNIQUE constraint failed: ledger_entries.digest"),
        _ => false,
    }
}

/// Transaction-style reference for a committed entry
fn commit_ref(entry: &NewLedgerEntry, timestamp: &str) -> String {
    let mut hasher = ContentHasher::new();
    for part in [
        entry.digest.as_str(),
        entry.signer_address.as_str(),
        entry.previous_digest.as_str(),
        entry.signature.as_str(),
        timestamp,
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize()
}

#[async_trait]
impl LedgerBackend for SqliteLedger {
    async fn is_registered(&self, digest: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT seq FROM ledger_entries WHERE digest = ?")
                .bind(digest)
                .fetch_optional(self.db.pool())
                .await
                .map_err(unavailable)?;
        Ok(found.is_some())
    }

    async fn latest_digest(&self, signer: &str) -> Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT digest FROM ledger_entries WHERE signer_address = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(signer)
        .fetch_optional(self.db.pool())
        .await
        .map_err(unavailable)
    }

    async fn append(&self, entry: NewLedgerEntry) -> Result<CommitReceipt> {
        let timestamp = format_timestamp(Utc::now());
        let commit_ref = commit_ref(&entry, &timestamp);

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (digest, signer_address, signature, previous_digest, original_name, size, commit_ref, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.digest)
        .bind(&entry.signer_address)
        .bind(&entry.signature)
        .bind(&entry.previous_digest)
        .bind(&entry.original_name)
        .bind(entry.size)
        .bind(&commit_ref)
        .bind(&timestamp)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(CommitReceipt {
                commit_ref,
                timestamp,
            }),
            Err(e) if is_digest_conflict(&e) => Err(AppError::AlreadyRegistered(entry.digest)),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as("SELECT * FROM ledger_entries ORDER BY seq ASC")
            .fetch_all(self.db.pool())
            .await
            .map_err(unavailable)
    }

    async fn entries_for(&self, signer: &str) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as("SELECT * FROM ledger_entries WHERE signer_address = ? ORDER BY seq ASC")
            .bind(signer)
            .fetch_all(self.db.pool())
            .await
            .map_err(unavailable)
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}
