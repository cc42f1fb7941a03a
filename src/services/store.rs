use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{format_timestamp, Database};
use crate::error::{AppError, Result};
use crate::models::{FileRecord, NewFile};
use crate::services::hasher::ContentHasher;
use crate::storage::{ByteStream, StorageProvider};

/// Metadata store plus byte storage for uploaded files
pub struct FileStore {
    db: Database,
    provider: Arc<dyn StorageProvider>,
}

/// Fields derived from a `NewFile` before anything is written
struct Prepared {
    id: String,
    original_name: String,
    extension: String,
    mime_type: Option<String>,
    storage_path: String,
    secret_hash: Option<String>,
}

/// Last path segment of a client-supplied name
fn clean_file_name(raw: &str) -> Result<String> {
    let name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if name.is_empty() || name == "." || name == ".." {
        return Err(AppError::BadRequest("Invalid file name".to_string()));
    }
    Ok(name)
}

fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string())
}

impl FileStore {
    pub fn new(db: Database, provider: Arc<dyn StorageProvider>) -> Self {
        tracing::info!("File store on {} storage", provider.storage_type());
        Self { db, provider }
    }

    fn prepare(meta: &NewFile) -> Result<Prepared> {
        let original_name = clean_file_name(&meta.original_name)?;
        let extension = Path::new(&original_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mime_type = meta.mime_type.clone().or_else(|| {
            mime_guess::from_path(&original_name)
                .first()
                .map(|m| m.to_string())
        });

        let id = Uuid::new_v4().to_string();
        // Shard by id prefix to keep directories small
        let storage_path = format!("{}/{}{}", &id[..2], id, extension);

        let secret_hash = match meta.access_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Some(hash_secret(secret)?),
            _ => None,
        };

        Ok(Prepared {
            id,
            original_name,
            extension,
            mime_type,
            storage_path,
            secret_hash,
        })
    }

    /// Store an in-memory upload
    pub async fn put(&self, data: Bytes, meta: NewFile) -> Result<FileRecord> {
        let prepared = Self::prepare(&meta)?;
        let digest = ContentHasher::digest(&data);
        let size = data.len() as i64;

        self.provider.put(&prepared.storage_path, data).await?;
        self.insert(prepared, meta, digest, size).await
    }

    /// Store an upload spooled to a local file whose digest is already known
    pub async fn put_file(
        &self,
        local_path: &Path,
        digest: &str,
        meta: NewFile,
    ) -> Result<FileRecord> {
        let prepared = Self::prepare(&meta)?;
        let metadata = tokio::fs::metadata(local_path).await?;
        let size = metadata.len() as i64;

        self.provider
            .put_file(&prepared.storage_path, local_path)
            .await?;
        self.insert(prepared, meta, digest.to_string(), size).await
    }

    async fn insert(
        &self,
        prepared: Prepared,
        meta: NewFile,
        digest: String,
        size: i64,
    ) -> Result<FileRecord> {
        let now = format_timestamp(Utc::now());
        let expires_at = meta.expires_at.map(format_timestamp);

        let result = sqlx::query(
            r#"
            INSERT INTO files (id, digest, storage_path, original_name, size, extension, mime_type, owner_id, access_secret_hash, receiver_email, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&prepared.id)
        .bind(&digest)
        .bind(&prepared.storage_path)
        .bind(&prepared.original_name)
        .bind(size)
        .bind(&prepared.extension)
        .bind(&prepared.mime_type)
        .bind(&meta.owner_id)
        .bind(&prepared.secret_hash)
        .bind(&meta.receiver_email)
        .bind(&expires_at)
        .bind(&now)
        .execute(self.db.pool())
        .await;

        if let Err(e) = result {
            // Do not leave orphaned bytes behind a failed insert
            if let Err(cleanup) = self.provider.delete(&prepared.storage_path).await {
                tracing::warn!(
                    "Failed to remove orphaned upload {}: {}",
                    prepared.storage_path,
                    cleanup
                );
            }
            return Err(AppError::StorageFailure(format!(
                "Failed to record upload: {}",
                e
            )));
        }

        tracing::info!(
            "Stored {} ({} bytes) for {} as {}",
            prepared.original_name,
            size,
            meta.owner_id,
            prepared.id
        );
        self.get(&prepared.id).await
    }

    /// Get a record by id, deleted or not
    pub async fn get(&self, id: &str) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Get a record that has not been deleted
    pub async fn find_live(&self, id: &str) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as("SELECT * FROM files WHERE id = ? AND deleted = 0")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(file)
    }

    /// Open the stored bytes; access rules are the caller's concern
    pub async fn open_for_download(&self, id: &str) -> Result<ByteStream> {
        let file = self.get(id).await?;
        if file.deleted {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        self.provider.open(&file.storage_path).await
    }

    /// Reserve a live record for its single download.
    /// Returns false when another download already holds it.
    pub async fn claim(&self, id: &str) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            "UPDATE files SET claimed_at = ? WHERE id = ? AND deleted = 0 AND claimed_at IS NULL",
        )
        .bind(&now)
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Tombstone a record and release its bytes.
    ///
    /// Only the call that flips `deleted` removes bytes and returns true;
    /// later calls are no-ops. Byte removal is best-effort.
    pub async fn mark_consumed(&self, id: &str) -> Result<bool> {
        let file = self.get(id).await?;
        let now = format_timestamp(Utc::now());

        let result =
            sqlx::query("UPDATE files SET deleted = 1, deleted_at = ? WHERE id = ? AND deleted = 0")
                .bind(&now)
                .bind(id)
                .execute(self.db.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Err(e) = self.provider.delete(&file.storage_path).await {
            tracing::warn!(
                "File {} is deleted but its bytes at {} could not be removed: {}",
                id,
                file.storage_path,
                e
            );
        }
        Ok(true)
    }

    /// Live records of one owner, newest first
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as(
            "SELECT * FROM files WHERE owner_id = ? AND deleted = 0 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(files)
    }

    /// Live records whose expiry is at or before `now`
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as(
            "SELECT * FROM files WHERE deleted = 0 AND expires_at IS NOT NULL AND expires_at <= ? ORDER BY expires_at ASC",
        )
        .bind(format_timestamp(now))
        .fetch_all(self.db.pool())
        .await?;
        Ok(files)
    }

    /// Exact match of a supplied secret against the record's stored hash.
    /// Records without a secret accept anything.
    pub fn secret_matches(file: &FileRecord, supplied: Option<&str>) -> Result<bool> {
        let Some(hash) = &file.access_secret_hash else {
            return Ok(true);
        };
        let Some(supplied) = supplied else {
            return Ok(false);
        };

        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(supplied.as_bytes(), &parsed)
            .is_ok())
    }
}
