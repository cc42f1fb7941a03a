use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Readable byte stream over stored content
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Storage provider trait
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store data under a new path; an existing path is never overwritten
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Store the content of a local file under a new path
    /// Default implementation reads file to memory and calls put (not efficient for large files)
    async fn put_file(&self, path: &str, local_path: &std::path::Path) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        self.put(path, Bytes::from(data)).await
    }

    /// Open stored data for streaming
    async fn open(&self, path: &str) -> Result<ByteStream>;

    /// Delete data from storage
    async fn delete(&self, path: &str) -> Result<()>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
