use std::path::{Path, PathBuf};

use chrono::Utc;
use muji_shared::constants::UPLOADS_URL_PREFIX;
use muji_store::BlobCleanup;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    // Canonicalize base; target may not exist yet so normalize manually
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .or_else(|_| target.strip_prefix(&canonical_base))
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
            _ => {} // RootDir, CurDir, Prefix: skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// Reduce a client-supplied filename to a safe single path component.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Where an accepted upload ended up.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Name on disk, unique within the upload directory.
    pub filename: String,
    /// Public URL under `/uploads`.
    pub url: String,
    pub path: PathBuf,
    pub size: usize,
}

/// Upload directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::UploadStorage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Upload store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Write an upload under a fresh unique name.
    ///
    /// The name is `<timestamp>_<uuid>_<sanitized original>`, so two
    /// uploads of the same file never collide.
    pub async fn store_upload(
        &self,
        original_name: &str,
        data: &[u8],
    ) -> Result<StoredBlob, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::UploadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let filename = format!(
            "{}_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            Uuid::new_v4().simple(),
            sanitize_filename(original_name)
        );
        let path = self.safe_path(&filename)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::UploadStorage(format!("Failed to write upload {}: {}", filename, e))
        })?;

        debug!(filename = %filename, size = data.len(), "Stored upload");
        Ok(StoredBlob {
            url: format!("{UPLOADS_URL_PREFIX}/{filename}"),
            filename,
            path,
            size: data.len(),
        })
    }

    /// Remove an upload by its on-disk name. Missing files are not an error.
    pub async fn delete_upload(&self, filename: &str) -> Result<(), ServerError> {
        let path = self.safe_path(filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(filename = %filename, "Deleted upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::UploadStorage(format!(
                "Failed to delete upload {}: {}",
                filename, e
            ))),
        }
    }

    /// Safe path for a single file name inside the upload directory.
    fn safe_path(&self, filename: &str) -> Result<PathBuf, ServerError> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(ServerError::BadRequest(
                "Path traversal detected".to_string(),
            ));
        }
        ensure_within(&self.base_path, &self.base_path.join(filename))
    }
}

impl BlobCleanup for BlobStore {
    fn remove_blob(&self, path: &str) -> std::io::Result<()> {
        let path = Path::new(path);
        let canonical_base = self
            .base_path
            .canonicalize()
            .unwrap_or_else(|_| self.base_path.clone());
        if !path.starts_with(&self.base_path) && !path.starts_with(&canonical_base) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is outside the upload directory", path.display()),
            ));
        }
        let inside = ensure_within(&self.base_path, path).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, e.to_string())
        })?;
        match std::fs::remove_file(inside) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_upload() {
        let (store, _dir) = test_store().await;

        let blob = store.store_upload("photo.jpg", b"jpeg-bytes").await.unwrap();
        assert!(blob.filename.ends_with("_photo.jpg"));
        assert_eq!(blob.url, format!("/uploads/{}", blob.filename));
        assert_eq!(blob.size, 10);
        assert_eq!(std::fs::read(&blob.path).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_same_name_does_not_collide() {
        let (store, _dir) = test_store().await;
        let a = store.store_upload("a.png", b"1").await.unwrap();
        let b = store.store_upload("a.png", b"2").await.unwrap();
        assert_ne!(a.filename, b.filename);
    }

    #[tokio::test]
    async fn test_limits() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.store_upload("a", b"").await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            store.store_upload("a", &[0u8; 2048]).await,
            Err(ServerError::UploadTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_hostile_names_are_flattened() {
        let (store, dir) = test_store().await;
        let blob = store
            .store_upload("../../etc/pass wd", b"x")
            .await
            .unwrap();
        assert!(blob.filename.ends_with("_pass_wd"));
        assert!(blob.path.starts_with(dir.path().canonicalize().unwrap()));
        assert!(store.delete_upload("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_removes_and_tolerates_missing() {
        let (store, _dir) = test_store().await;
        let blob = store.store_upload("a.txt", b"x").await.unwrap();
        let path = blob.path.to_string_lossy().to_string();

        store.remove_blob(&path).unwrap();
        assert!(!blob.path.exists());
        store.remove_blob(&path).unwrap();
        store.delete_upload(&blob.filename).await.unwrap();

        assert!(store.remove_blob("/etc/hostname").is_err());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_filename("résumé v2.pdf"), "r_sum__v2.pdf");
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename("C:\\x\\y.png"), "y.png");
    }
}
