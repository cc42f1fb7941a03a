pub mod backend;
mod queue;
pub mod signer;
pub mod sqlite;

pub use backend::*;
pub use signer::LedgerSigner;
pub use sqlite::SqliteLedger;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use crate::config::LedgerConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{ChainAudit, CommitReceipt, LedgerEntry, NewLedgerEntry, NotarizationReceipt};
use crate::services::hasher::{normalize_digest, GENESIS_DIGEST};
use queue::{Registration, SignerQueue};

/// Checked operations over a backend, shared with the queue workers
pub(crate) struct LedgerCore {
    backend: Arc<dyn LedgerBackend>,
    timeout: Duration,
}

impl LedgerCore {
    async fn is_registered(&self, digest: &str) -> Result<bool> {
        self.backend.is_registered(digest).await
    }

    async fn previous_entry_digest(&self, signer: &str) -> Result<String> {
        Ok(self
            .backend
            .latest_digest(signer)
            .await?
            .unwrap_or_else(|| GENESIS_DIGEST.to_string()))
    }

    async fn register(
        &self,
        signer: &str,
        digest: &str,
        signature: &str,
        previous_digest: &str,
        original_name: &str,
        size: i64,
    ) -> Result<CommitReceipt> {
        if !LedgerSigner::verify(signer, digest, signature)? {
            return Err(AppError::BadRequest(
                "Signature does not match signer and digest".to_string(),
            ));
        }

        let entry = NewLedgerEntry {
            digest: digest.to_string(),
            signer_address: signer.to_string(),
            signature: signature.to_string(),
            previous_digest: previous_digest.to_string(),
            original_name: original_name.to_string(),
            size,
        };

        let commit = async {
            if self.backend.is_registered(&entry.digest).await? {
                return Err(AppError::AlreadyRegistered(entry.digest.clone()));
            }
            self.backend.append(entry).await
        };

        tokio::time::timeout(self.timeout, commit)
            .await
            .map_err(|_| AppError::LedgerTimeout(self.timeout))?
    }
}

#[derive(Default)]
struct QueueState {
    closed: bool,
    queues: HashMap<String, SignerQueue>,
}

/// Append-only integrity ledger.
///
/// Registrations submitted through [`IntegrityLedger::notarize`] are
/// serialized per signer so each signer's `previous_digest` values form a
/// single chain. [`IntegrityLedger::register`] is the unqueued primitive and
/// leaves ordering to the caller.
pub struct IntegrityLedger {
    core: Arc<LedgerCore>,
    signer: Arc<LedgerSigner>,
    queue_depth: usize,
    state: Mutex<QueueState>,
}

impl IntegrityLedger {
    pub fn new(
        backend: Arc<dyn LedgerBackend>,
        signer: LedgerSigner,
        timeout: Duration,
        queue_depth: usize,
    ) -> Self {
        tracing::info!(
            "Integrity ledger on {} backend, signer {}",
            backend.backend_type(),
            signer.address()
        );
        Self {
            core: Arc::new(LedgerCore { backend, timeout }),
            signer: Arc::new(signer),
            queue_depth,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Ledger over the service database with the configured signing key
    pub fn from_config(config: &LedgerConfig, db: Database) -> Result<Self> {
        let signer = LedgerSigner::from_hex(&config.signer_key)?;
        Ok(Self::new(
            Arc::new(SqliteLedger::new(db)),
            signer,
            Duration::from_secs(config.registration_timeout_secs),
            config.queue_depth,
        ))
    }

    /// The service's own signing identity
    pub fn signer(&self) -> &Arc<LedgerSigner> {
        &self.signer
    }

    pub async fn is_registered(&self, digest: &str) -> Result<bool> {
        let digest = normalize_digest(digest)?;
        self.core.is_registered(&digest).await
    }

    /// Most recent digest registered by `signer`, or the genesis digest
    pub async fn previous_entry_digest(&self, signer: &str) -> Result<String> {
        self.core.previous_entry_digest(signer).await
    }

    /// Append one entry after checking the digest is new and the signature
    /// is valid. Bounded by the registration timeout.
    pub async fn register(
        &self,
        signer: &str,
        digest: &str,
        signature: &str,
        previous_digest: &str,
        original_name: &str,
        size: i64,
    ) -> Result<CommitReceipt> {
        let digest = normalize_digest(digest)?;
        self.core
            .register(signer, &digest, signature, previous_digest, original_name, size)
            .await
    }

    pub fn signature_for(&self, digest: &str, signer: &LedgerSigner) -> Result<String> {
        signer.sign_digest(digest)
    }

    /// Register a digest under the service signer
    pub async fn notarize(
        &self,
        digest: &str,
        original_name: &str,
        size: i64,
    ) -> Result<NotarizationReceipt> {
        let signer = self.signer.clone();
        self.notarize_with(signer, digest, original_name, size).await
    }

    /// Register a digest through the signer's single-writer queue
    pub async fn notarize_with(
        &self,
        signer: Arc<LedgerSigner>,
        digest: &str,
        original_name: &str,
        size: i64,
    ) -> Result<NotarizationReceipt> {
        let digest = normalize_digest(digest)?;

        let sender = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(AppError::LedgerUnavailable(
                    "Ledger is shutting down".to_string(),
                ));
            }
            state
                .queues
                .entry(signer.address().to_string())
                .or_insert_with(|| {
                    SignerQueue::spawn(self.core.clone(), signer.clone(), self.queue_depth)
                })
                .sender()
        };

        let (reply, receipt) = oneshot::channel();
        sender
            .send(Registration {
                digest,
                original_name: original_name.to_string(),
                size,
                reply,
            })
            .await
            .map_err(|_| AppError::LedgerUnavailable("Ledger queue closed".to_string()))?;

        receipt
            .await
            .map_err(|_| AppError::LedgerUnavailable("Ledger queue dropped the registration".to_string()))?
    }

    /// Every registration ever committed, oldest first
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        self.core.backend.entries().await
    }

    /// Walk one signer's chain from genesis, checking links and signatures
    pub async fn audit_chain(&self, signer: &str) -> Result<ChainAudit> {
        let entries = self.core.backend.entries_for(signer).await?;
        let mut expected_previous = GENESIS_DIGEST.to_string();

        for entry in &entries {
            let problem = if entry.previous_digest != expected_previous {
                Some(format!(
                    "links to {} but the preceding entry is {}",
                    entry.previous_digest, expected_previous
                ))
            } else if !LedgerSigner::verify(signer, &entry.digest, &entry.signature)? {
                Some("signature does not verify".to_string())
            } else {
                None
            };

            if let Some(problem) = problem {
                return Ok(ChainAudit {
                    signer: signer.to_string(),
                    length: entries.len(),
                    head: entries
                        .last()
                        .map(|e| e.digest.clone())
                        .unwrap_or_else(|| GENESIS_DIGEST.to_string()),
                    valid: false,
                    broken_at: Some(entry.digest.clone()),
                    problem: Some(problem),
                });
            }
            expected_previous = entry.digest.clone();
        }

        Ok(ChainAudit {
            signer: signer.to_string(),
            length: entries.len(),
            head: expected_previous,
            valid: true,
            broken_at: None,
            problem: None,
        })
    }

    /// Refuse new registrations and drain every signer queue
    pub async fn close(&self) {
        let queues = {
            let mut state = self.state.lock().await;
            state.closed = true;
            std::mem::take(&mut state.queues)
        };

        for (_, queue) in queues {
            queue.shutdown().await;
        }
        tracing::info!("Integrity ledger closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hasher::ContentHasher;
    use async_trait::async_trait;

    async fn ledger() -> IntegrityLedger {
        let db = Database::in_memory().await.unwrap();
        IntegrityLedger::new(
            Arc::new(SqliteLedger::new(db)),
            LedgerSigner::generate(),
            Duration::from_secs(5),
            8,
        )
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let ledger = ledger().await;
        let signer = ledger.signer().clone();
        let digest = ContentHasher::digest(b"contract.pdf");
        let signature = ledger.signature_for(&digest, &signer).unwrap();
        let previous = ledger.previous_entry_digest(signer.address()).await.unwrap();
        assert_eq!(previous, GENESIS_DIGEST);

        ledger
            .register(signer.address(), &digest, &signature, &previous, "contract.pdf", 12)
            .await
            .unwrap();
        let second = ledger
            .register(signer.address(), &digest, &signature, &previous, "contract.pdf", 12)
            .await;
        assert!(matches!(second, Err(AppError::AlreadyRegistered(_))));

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.iter().filter(|e| e.digest == digest).count(), 1);
        assert!(ledger.is_registered(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_signer_cannot_claim_digest() {
        let ledger = ledger().await;
        let signer_a = Arc::new(LedgerSigner::generate());
        let signer_b = Arc::new(LedgerSigner::generate());
        let digest = ContentHasher::digest(b"same bytes");

        ledger
            .notarize_with(signer_a.clone(), &digest, "a.bin", 10)
            .await
            .unwrap();
        let rejected = ledger
            .notarize_with(signer_b.clone(), &digest, "b.bin", 10)
            .await;
        assert!(matches!(rejected, Err(AppError::AlreadyRegistered(_))));

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].signer_address, signer_a.address());
        assert_eq!(
            ledger.previous_entry_digest(signer_b.address()).await.unwrap(),
            GENESIS_DIGEST
        );
    }

    #[tokio::test]
    async fn test_invalid_signature_is_refused() {
        let ledger = ledger().await;
        let signer = ledger.signer().clone();
        let stranger = LedgerSigner::generate();
        let digest = ContentHasher::digest(b"forged");
        let forged = stranger.sign_digest(&digest).unwrap();

        let result = ledger
            .register(signer.address(), &digest, &forged, GENESIS_DIGEST, "x", 1)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(!ledger.is_registered(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_notarizations_form_one_chain() {
        let ledger = Arc::new(ledger().await);

        let mut handles = Vec::new();
        for i in 0..12u8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let digest = ContentHasher::digest(&[i; 16]);
                ledger.notarize(&digest, &format!("file-{}", i), 16).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let audit = ledger.audit_chain(ledger.signer().address()).await.unwrap();
        assert!(audit.valid, "chain broken: {:?}", audit.problem);
        assert_eq!(audit.length, 12);

        // Every previous digest is used exactly once
        let entries = ledger.entries().await.unwrap();
        let mut previous: Vec<_> = entries.iter().map(|e| e.previous_digest.clone()).collect();
        previous.sort();
        previous.dedup();
        assert_eq!(previous.len(), 12);
    }

    #[tokio::test]
    async fn test_unqueued_stale_previous_is_reported_by_audit() {
        let ledger = ledger().await;
        let signer = ledger.signer().clone();

        for content in [b"one".as_slice(), b"two".as_slice()] {
            let digest = ContentHasher::digest(content);
            let signature = signer.sign_digest(&digest).unwrap();
            // Both registrations claim the genesis as their predecessor
            ledger
                .register(signer.address(), &digest, &signature, GENESIS_DIGEST, "f", 3)
                .await
                .unwrap();
        }

        let audit = ledger.audit_chain(signer.address()).await.unwrap();
        assert!(!audit.valid);
        assert_eq!(audit.broken_at, Some(ContentHasher::digest(b"two")));
    }

    struct SlowBackend;

    #[async_trait]
    impl LedgerBackend for SlowBackend {
        async fn is_registered(&self, _digest: &str) -> Result<bool> {
            Ok(false)
        }
        async fn latest_digest(&self, _signer: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn append(&self, _entry: NewLedgerEntry) -> Result<CommitReceipt> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(AppError::Internal("unreachable".into()))
        }
        async fn entries(&self) -> Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
        async fn entries_for(&self, _signer: &str) -> Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
        fn backend_type(&self) -> &'static str {
            "slow"
        }
    }

    struct DownBackend;

    #[async_trait]
    impl LedgerBackend for DownBackend {
        async fn is_registered(&self, _digest: &str) -> Result<bool> {
            Err(AppError::LedgerUnavailable("connection refused".into()))
        }
        async fn latest_digest(&self, _signer: &str) -> Result<Option<String>> {
            Err(AppError::LedgerUnavailable("connection refused".into()))
        }
        async fn append(&self, _entry: NewLedgerEntry) -> Result<CommitReceipt> {
            Err(AppError::LedgerUnavailable("connection refused".into()))
        }
        async fn entries(&self) -> Result<Vec<LedgerEntry>> {
            Err(AppError::LedgerUnavailable("connection refused".into()))
        }
        async fn entries_for(&self, _signer: &str) -> Result<Vec<LedgerEntry>> {
            Err(AppError::LedgerUnavailable("connection refused".into()))
        }
        fn backend_type(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let ledger = IntegrityLedger::new(
            Arc::new(SlowBackend),
            LedgerSigner::generate(),
            Duration::from_millis(50),
            4,
        );
        let digest = ContentHasher::digest(b"slow");
        let result = ledger.notarize(&digest, "slow.bin", 4).await;
        assert!(matches!(result, Err(AppError::LedgerTimeout(_))));
    }

    #[tokio::test]
    async fn test_unavailable_backend_surfaces() {
        let ledger = IntegrityLedger::new(
            Arc::new(DownBackend),
            LedgerSigner::generate(),
            Duration::from_secs(1),
            4,
        );
        let digest = ContentHasher::digest(b"down");
        let result = ledger.notarize(&digest, "down.bin", 4).await;
        assert!(matches!(result, Err(AppError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_closed_ledger_refuses_work() {
        let ledger = ledger().await;
        let first = ContentHasher::digest(b"before close");
        ledger.notarize(&first, "a", 1).await.unwrap();

        ledger.close().await;

        let second = ContentHasher::digest(b"after close");
        let result = ledger.notarize(&second, "b", 1).await;
        assert!(matches!(result, Err(AppError::LedgerUnavailable(_))));
        assert!(ledger.is_registered(&first).await.unwrap());
    }
}
