use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::NotarizationReceipt;

/// Stored file record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub digest: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub original_name: String,
    pub size: i64,
    pub extension: String,
    pub mime_type: Option<String>,
    pub owner_id: String,
    #[serde(skip_serializing)]
    pub access_secret_hash: Option<String>,
    pub receiver_email: Option<String>,
    pub expires_at: Option<String>,
    #[serde(skip_serializing)]
    pub claimed_at: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

impl FileRecord {
    pub fn has_secret(&self) -> bool {
        self.access_secret_hash.is_some()
    }

    /// Parsed expiry; an unparsable stored value counts as already expired
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at.as_deref().map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    /// Expiry is inclusive: a record is gone at its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|expiry| now >= expiry)
    }
}

/// Metadata supplied alongside the bytes of a new file
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub original_name: String,
    pub owner_id: String,
    pub access_secret: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    pub receiver_email: Option<String>,
}

/// File record as listed to its owner
#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub digest: String,
    pub original_name: String,
    pub size: i64,
    pub extension: String,
    pub mime_type: Option<String>,
    pub has_password: bool,
    pub receiver_email: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub download_link: String,
}

impl FileResponse {
    pub fn from_record(file: FileRecord, download_link: String) -> Self {
        let has_password = file.has_secret();
        Self {
            id: file.id,
            digest: file.digest,
            original_name: file.original_name,
            size: file.size,
            extension: file.extension,
            mime_type: file.mime_type,
            has_password,
            receiver_email: file.receiver_email,
            expires_at: file.expires_at,
            created_at: file.created_at,
            download_link,
        }
    }
}

/// File list response
#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
}

/// What happened to the ledger registration of an upload
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotarizationOutcome {
    Committed(NotarizationReceipt),
    /// File was stored but the ledger did not accept the registration
    Failed { reason: String, message: String },
    Skipped,
}

/// Upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub link: String,
    pub file_hash: String,
    pub file_name: String,
    pub file_size: i64,
    pub expires_at: Option<String>,
    pub notarization: NotarizationOutcome,
    pub email_sent: bool,
}

/// Verify response
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub file_hash: String,
    pub valid: bool,
    pub status: String,
}

/// Request to e-mail a download link
#[derive(Debug, Deserialize)]
pub struct SendLinkRequest {
    #[serde(alias = "receiverEmail")]
    pub receiver_email: String,
    #[serde(alias = "fileId", alias = "fileID")]
    pub file_id: String,
    #[serde(alias = "senderName")]
    pub sender_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::format_timestamp;

    fn record(expires_at: Option<String>) -> FileRecord {
        FileRecord {
            id: "id".into(),
            digest: "0x00".into(),
            storage_path: "id/id".into(),
            original_name: "a.txt".into(),
            size: 1,
            extension: ".txt".into(),
            mime_type: None,
            owner_id: "alice".into(),
            access_secret_hash: None,
            receiver_email: None,
            expires_at,
            claimed_at: None,
            deleted: false,
            deleted_at: None,
            created_at: format_timestamp(Utc::now()),
        }
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let at = Utc::now();
        let file = record(Some(format_timestamp(at)));
        let expiry = file.expiry().unwrap();
        assert!(file.is_expired_at(expiry));
        assert!(!file.is_expired_at(expiry - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let file = record(None);
        assert!(!file.is_expired_at(Utc::now() + chrono::Duration::days(3650)));
    }

    #[test]
    fn test_corrupt_expiry_counts_as_expired() {
        let file = record(Some("not-a-date".into()));
        assert!(file.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_secret_hash_not_serialized() {
        let mut file = record(None);
        file.access_secret_hash = Some("$argon2id$...".into());
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("access_secret_hash").is_none());
        assert!(json.get("storage_path").is_none());
    }
}
