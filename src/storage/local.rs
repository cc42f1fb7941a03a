use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{ByteStream, StorageProvider};

/// Local file system storage provider
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn get_full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(AppError::StorageFailure(format!(
                "Invalid storage path: {}",
                path
            )));
        }
        Ok(self.base_path.join(relative))
    }

    /// Create the destination, refusing to replace an existing file
    async fn create_new(&self, full_path: &Path) -> Result<fs::File> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(full_path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    AppError::StorageFailure(format!("Refusing to overwrite {:?}", full_path))
                } else {
                    AppError::StorageFailure(format!("Failed to create file: {}", e))
                }
            })
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let full_path = self.get_full_path(path)?;

        let mut file = self.create_new(&full_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!("Saved file to {:?}", full_path);
        Ok(())
    }

    async fn put_file(&self, path: &str, local_path: &Path) -> Result<()> {
        let full_path = self.get_full_path(path)?;

        let mut source = fs::File::open(local_path).await?;
        let mut dest = self.create_new(&full_path).await?;
        tokio::io::copy(&mut source, &mut dest).await?;
        dest.flush().await?;

        tracing::debug!("Copied file from {:?} to {:?}", local_path, full_path);
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<ByteStream> {
        let full_path = self.get_full_path(path)?;

        let file = fs::File::open(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("File content not found: {}", path))
            } else {
                AppError::StorageFailure(format!("Failed to read file: {}", e))
            }
        })?;

        Ok(Box::pin(file))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.get_full_path(path)?;

        if full_path.exists() {
            fs::remove_file(&full_path).await?;
            tracing::debug!("Deleted file {:?}", full_path);

            // Try to remove empty parent directories
            let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
            while let Some(dir) = current_dir {
                if dir == self.base_path {
                    break;
                }
                match fs::read_dir(&dir).await {
                    Ok(mut entries) => {
                        if entries.next_entry().await?.is_some() {
                            break;
                        }
                        let _ = fs::remove_dir(&dir).await;
                    }
                    Err(_) => break,
                }
                current_dir = dir.parent().map(|p| p.to_path_buf());
            }
        }

        Ok(())
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
