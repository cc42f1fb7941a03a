use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{AppError, Result};
use crate::models::FileRecord;
use crate::services::FileStore;
use crate::storage::ByteStream;

/// Why a download was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Unknown id, deleted record or wrong secret
    AccessRefused,
    Expired,
    /// Record exists but its single download is taken or its bytes are gone
    NotFound,
}

impl From<DenyReason> for AppError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::AccessRefused => AppError::AccessRefused("Access denied".to_string()),
            DenyReason::Expired => AppError::Expired(
                "File has expired and is no longer available.".to_string(),
            ),
            DenyReason::NotFound => AppError::NotFound("File not found".to_string()),
        }
    }
}

pub enum DownloadDecision {
    Authorized(AuthorizedDownload),
    Denied(DenyReason),
}

/// A granted download: the record, the name to present and the bytes
pub struct AuthorizedDownload {
    pub record: FileRecord,
    pub filename: String,
    pub reader: ConsumingReader,
}

/// Runs `mark_consumed` for one record exactly once
struct ConsumeGuard {
    store: Option<Arc<FileStore>>,
    id: String,
}

impl ConsumeGuard {
    async fn consume(mut self) -> Result<bool> {
        match self.store.take() {
            Some(store) => store.mark_consumed(&self.id).await,
            None => Ok(false),
        }
    }
}

impl Drop for ConsumeGuard {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.mark_consumed(&id).await {
                        tracing::warn!("Failed to consume downloaded file {}: {}", id, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("No runtime to consume downloaded file {}; left claimed", id);
            }
        }
    }
}

/// Byte stream of an authorized download.
///
/// The record is consumed when the reader is finished or dropped, whether
/// the transfer completed, failed or was abandoned.
pub struct ConsumingReader {
    inner: ByteStream,
    guard: ConsumeGuard,
}

impl ConsumingReader {
    /// Consume the record now instead of on drop
    pub async fn finish(self) -> Result<bool> {
        self.guard.consume().await
    }
}

impl AsyncRead for ConsumingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_read(cx, buf)
    }
}

/// Decides whether a download request may receive a file's bytes
pub struct AccessGate {
    store: Arc<FileStore>,
}

impl AccessGate {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    /// Checks run in a fixed order: existence and secret, then expiry,
    /// then the single-download claim.
    pub async fn authorize_download(
        &self,
        id: &str,
        supplied_secret: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DownloadDecision> {
        let Some(record) = self.store.find_live(id).await? else {
            return Ok(DownloadDecision::Denied(DenyReason::AccessRefused));
        };

        if !FileStore::secret_matches(&record, supplied_secret)? {
            return Ok(DownloadDecision::Denied(DenyReason::AccessRefused));
        }

        if record.is_expired_at(now) {
            if let Err(e) = self.store.mark_consumed(&record.id).await {
                tracing::warn!("Failed to retire expired file {}: {}", record.id, e);
            }
            return Ok(DownloadDecision::Denied(DenyReason::Expired));
        }

        if !self.store.claim(&record.id).await? {
            return Ok(DownloadDecision::Denied(DenyReason::NotFound));
        }

        // From here every path ends in exactly one mark_consumed
        let guard = ConsumeGuard {
            store: Some(self.store.clone()),
            id: record.id.clone(),
        };

        let inner = match self.store.open_for_download(&record.id).await {
            Ok(inner) => inner,
            Err(e) => {
                if let Err(consume_err) = guard.consume().await {
                    tracing::warn!(
                        "Failed to consume unreadable file {}: {}",
                        record.id,
                        consume_err
                    );
                }
                return match e {
                    AppError::NotFound(_) => Ok(DownloadDecision::Denied(DenyReason::NotFound)),
                    other => Err(other),
                };
            }
        };

        let filename = if record.original_name.is_empty() {
            "downloaded_file".to_string()
        } else {
            record.original_name.clone()
        };

        Ok(DownloadDecision::Authorized(AuthorizedDownload {
            record,
            filename,
            reader: ConsumingReader { inner, guard },
        }))
    }
}
