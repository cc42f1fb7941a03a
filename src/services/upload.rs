use bytes::Bytes;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::ledger::IntegrityLedger;
use crate::models::{FileRecord, NewFile, NotarizationOutcome, UploadResponse};
use crate::services::{ContentHasher, FileStore, Mailer};

/// Where the bytes of an upload currently live
pub enum UploadSource {
    Memory(Bytes),
    /// Spooled to disk by the handler
    TempFile(PathBuf),
}

impl UploadSource {
    async fn digest(&self) -> Result<String> {
        match self {
            UploadSource::Memory(data) => Ok(ContentHasher::digest(data)),
            UploadSource::TempFile(path) => ContentHasher::digest_file(path).await,
        }
    }
}

/// Upload flow: hash, store, notarize, notify
pub struct UploadService;

impl UploadService {
    /// Store a file and, when asked, register its digest on the ledger.
    ///
    /// A digest already on the ledger is rejected before anything is
    /// stored. A ledger failure after the bytes are stored does not undo
    /// the upload; it is reported in the response instead.
    pub async fn upload(
        config: &Config,
        store: &FileStore,
        ledger: &IntegrityLedger,
        mailer: &Mailer,
        source: UploadSource,
        meta: NewFile,
        notarize: bool,
    ) -> Result<UploadResponse> {
        let digest = source.digest().await?;

        if notarize && ledger.is_registered(&digest).await? {
            return Err(AppError::AlreadyRegistered(digest));
        }

        let file = match source {
            UploadSource::Memory(data) => store.put(data, meta).await?,
            UploadSource::TempFile(path) => store.put_file(&path, &digest, meta).await?,
        };

        let notarization = if notarize {
            match ledger
                .notarize(&file.digest, &file.original_name, file.size)
                .await
            {
                Ok(receipt) => NotarizationOutcome::Committed(receipt),
                Err(e) => {
                    tracing::warn!(
                        "File {} stored but its digest {} was not registered: {}",
                        file.id,
                        file.digest,
                        e
                    );
                    NotarizationOutcome::Failed {
                        reason: e.reason().to_string(),
                        message: e.to_string(),
                    }
                }
            }
        } else {
            NotarizationOutcome::Skipped
        };

        let link = config.download_link(&file.id);
        let email_sent = Self::notify_receiver(mailer, &file, &link).await;

        Ok(UploadResponse {
            id: file.id,
            link,
            file_hash: file.digest,
            file_name: file.original_name,
            file_size: file.size,
            expires_at: file.expires_at,
            notarization,
            email_sent,
        })
    }

    async fn notify_receiver(mailer: &Mailer, file: &FileRecord, link: &str) -> bool {
        let Some(receiver) = file.receiver_email.as_deref() else {
            return false;
        };
        if !mailer.is_enabled() {
            tracing::debug!("Mail disabled; not notifying {}", receiver);
            return false;
        }
        match mailer.send_download_link(receiver, link, None).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to e-mail link for {} to {}: {}", file.id, receiver, e);
                false
            }
        }
    }
}
