use async_trait::async_trait;
use log::{error, info};
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed image storage; `hash` is the lowercase hex SHA-256 of the bytes.
/// Stored images are never removed: identical uploads share one file.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    /// Returns the bytes and their sniffed MIME type.
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
}

/// Public URL an uploaded image is served from.
pub fn public_url(hash: &str) -> String {
    format!("/uploads/{hash}")
}

/// SHA-256 hex digests only; anything else could escape the upload root.
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Local filesystem backend laid out as `<root>/<first two hex chars>/<hash>`.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("image store rooted at '{}'", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, ImageStoreError> {
        if !is_valid_hash(hash) {
            return Err(ImageStoreError::NotFound);
        }
        Ok(self.root.join(&hash[0..2]).join(hash))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let path = self.path_for(hash).map_err(|_| ImageStoreError::Other(format!("invalid hash '{hash}'")))?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| ImageStoreError::Other(e.to_string()))?;
        }
        // a file under the final hash is always complete
        let tmp = path.with_extension("part");
        let written = async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(e) = written {
            error!("failed to store image hash={hash} path={}: {e}", path.display());
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ImageStoreError::Other(e.to_string()));
        }
        Ok(())
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let path = self.path_for(hash)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ImageStoreError::NotFound),
            Err(e) => return Err(ImageStoreError::Other(e.to_string())),
        };
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn hash_validation() {
        assert!(is_valid_hash(HASH));
        assert!(!is_valid_hash("../../etc/passwd"));
        assert!(!is_valid_hash(&HASH.to_uppercase()));
        assert!(!is_valid_hash(&HASH[..10]));
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path()).unwrap();
        store.save(HASH, "text/plain", b"test").await.unwrap();
        assert!(matches!(store.save(HASH, "text/plain", b"test").await, Err(ImageStoreError::Duplicate)));

        let (bytes, mime) = store.load(HASH).await.unwrap();
        assert_eq!(bytes, b"test");
        assert_eq!(mime, "application/octet-stream");
        assert!(matches!(store.load(&HASH.replace('9', "8")).await, Err(ImageStoreError::NotFound)));
    }
}
