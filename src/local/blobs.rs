//! Filesystem object storage for image bytes.
//!
//! Blobs are stored per-project for easy cleanup:
//! ```text
//! .corpus/blobs/projects/{project_id}/images/{image_id}/{content_hash}{ext}
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Result of an upload: the key for later deletion, plus a resolvable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub storage_key: String,
    pub url: String,
}

/// Seam over object storage so the image pipeline can be exercised without
/// touching a disk or a bucket.
pub trait ImageStorage: Send + Sync {
    /// Store image bytes, returning the storage key and URL.
    fn upload(
        &self,
        project_id: &str,
        image_id: &str,
        bytes: &[u8],
        content_type: &str,
        filename: Option<&str>,
    ) -> impl Future<Output = Result<StoredImage>> + Send;

    /// Delete a stored object. Returns false if it was already absent.
    fn delete(&self, storage_key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Resolve a storage key to a servable URL.
    fn resolve_url(&self, storage_key: &str) -> String;
}

/// Content-addressed blob storage on the local filesystem.
pub struct BlobStorage {
    blobs_dir: PathBuf,
    public_base_url: Option<String>,
}

impl BlobStorage {
    pub async fn new(blobs_dir: PathBuf, public_base_url: Option<String>) -> Result<Self> {
        tokio::fs::create_dir_all(&blobs_dir)
            .await
            .context("Failed to create blobs directory")?;

        Ok(Self {
            blobs_dir,
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    fn extension(content_type: &str, filename: Option<&str>) -> String {
        if let Some(ext) = filename.and_then(|f| f.rsplit_once('.').map(|(_, e)| e)) {
            return format!(".{}", ext.to_lowercase());
        }
        match content_type {
            "image/jpeg" => ".jpg".to_string(),
            "image/png" => ".png".to_string(),
            "image/webp" => ".webp".to_string(),
            "image/gif" => ".gif".to_string(),
            _ => ".bin".to_string(),
        }
    }
}

impl ImageStorage for BlobStorage {
    async fn upload(
        &self,
        project_id: &str,
        image_id: &str,
        bytes: &[u8],
        content_type: &str,
        filename: Option<&str>,
    ) -> Result<StoredImage> {
        let hash = hex::encode(Sha256::digest(bytes));
        let ext = Self::extension(content_type, filename);
        let key = format!("projects/{project_id}/images/{image_id}/{hash}{ext}");
        let path = self.blobs_dir.join(&key);

        if !path.exists() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await?;
        }

        let url = self.resolve_url(&key);
        Ok(StoredImage {
            storage_key: key,
            url,
        })
    }

    async fn delete(&self, storage_key: &str) -> Result<bool> {
        let path = self.blobs_dir.join(storage_key);
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(&path).await?;
        Ok(true)
    }

    fn resolve_url(&self, storage_key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{storage_key}"),
            None => self.blobs_dir.join(storage_key).display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_and_delete() {
        let dir = tempdir().unwrap();
        let storage = BlobStorage::new(dir.path().join("blobs"), None).await.unwrap();

        let stored = storage
            .upload("proj-1", "img-1", b"png bytes", "image/png", None)
            .await
            .unwrap();

        assert!(stored.storage_key.starts_with("projects/proj-1/images/img-1/"));
        assert!(stored.storage_key.ends_with(".png"));

        assert!(storage.delete(&stored.storage_key).await.unwrap());
        // Second delete: already absent, not an error.
        assert!(!storage.delete(&stored.storage_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_is_content_addressed() {
        let dir = tempdir().unwrap();
        let storage = BlobStorage::new(dir.path().join("blobs"), None).await.unwrap();

        let a = storage
            .upload("p", "i", b"same", "image/png", None)
            .await
            .unwrap();
        let b = storage
            .upload("p", "i", b"same", "image/png", None)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_public_base_url_resolution() {
        let dir = tempdir().unwrap();
        let storage = BlobStorage::new(
            dir.path().join("blobs"),
            Some("https://cdn.example/".to_string()),
        )
        .await
        .unwrap();

        let stored = storage
            .upload("p", "i", b"bytes", "image/jpeg", Some("photo.JPEG"))
            .await
            .unwrap();
        assert!(stored.url.starts_with("https://cdn.example/projects/p/"));
        assert!(stored.storage_key.ends_with(".jpeg"));
    }
}
