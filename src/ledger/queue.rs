use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::ledger::{LedgerCore, LedgerSigner};
use crate::models::NotarizationReceipt;

/// One pending registration and the channel its result goes back on
pub(crate) struct Registration {
    pub digest: String,
    pub original_name: String,
    pub size: i64,
    pub reply: oneshot::Sender<Result<NotarizationReceipt>>,
}

/// Single writer for one signer's chain.
///
/// Registrations are processed strictly in submission order, so the
/// previous-digest read and the append for one job never interleave with
/// another job of the same signer.
pub(crate) struct SignerQueue {
    sender: mpsc::Sender<Registration>,
    worker: JoinHandle<()>,
}

impl SignerQueue {
    pub fn spawn(core: Arc<LedgerCore>, signer: Arc<LedgerSigner>, depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel(depth.max(1));
        let worker = tokio::spawn(run(core, signer, receiver));
        Self { sender, worker }
    }

    pub fn sender(&self) -> mpsc::Sender<Registration> {
        self.sender.clone()
    }

    /// Stop accepting work and wait for queued registrations to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            tracing::error!("Ledger queue worker panicked: {}", e);
        }
    }
}

async fn run(
    core: Arc<LedgerCore>,
    signer: Arc<LedgerSigner>,
    mut receiver: mpsc::Receiver<Registration>,
) {
    tracing::debug!("Ledger queue started for {}", signer.address());

    while let Some(job) = receiver.recv().await {
        let result = process(&core, &signer, &job).await;
        match &result {
            Ok(receipt) => tracing::info!(
                "Ledger commit {} for {} by {}",
                receipt.tx_hash,
                receipt.digest,
                receipt.signer
            ),
            Err(e) => tracing::warn!("Ledger registration of {} failed: {}", job.digest, e),
        }
        if job.reply.send(result).is_err() {
            tracing::debug!("Registration caller for {} went away", job.digest);
        }
    }

    tracing::debug!("Ledger queue stopped for {}", signer.address());
}

async fn process(
    core: &LedgerCore,
    signer: &LedgerSigner,
    job: &Registration,
) -> Result<NotarizationReceipt> {
    if core.is_registered(&job.digest).await? {
        return Err(AppError::AlreadyRegistered(job.digest.clone()));
    }

    // Read inside the worker so no other registration of this signer can land in between
    let previous = core.previous_entry_digest(signer.address()).await?;
    let signature = signer.sign_digest(&job.digest)?;
    let receipt = core
        .register(
            signer.address(),
            &job.digest,
            &signature,
            &previous,
            &job.original_name,
            job.size,
        )
        .await?;

    Ok(NotarizationReceipt {
        digest: job.digest.clone(),
        tx_hash: receipt.commit_ref,
        signature,
        previous_hash: previous,
        signer: signer.address().to_string(),
        timestamp: receipt.timestamp,
    })
}
