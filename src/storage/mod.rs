use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of a successful put
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub checksum: String,
}

/// Blob storage for uploaded documents
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// Stores objects as files under `<root>/<bucket>/<key>`
pub struct LocalDiskStore {
    root: PathBuf,
    public_url: String,
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_segment(bucket)?;
        validate_segment(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalDiskStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());

        Ok(StoredObject {
            key: key.to_string(),
            url: format!("{}/{}/{}", self.public_url, bucket, key),
            size: bytes.len() as u64,
            checksum: sha256_hex(bytes),
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path).await?;
        Ok(())
    }
}

/// Keys are single path segments; anything that could escape the bucket is refused.
fn validate_segment(segment: &str) -> Result<(), StorageError> {
    let path = Path::new(segment);
    let single = path.components().count() == 1
        && !segment.contains('/')
        && !segment.contains('\\')
        && segment != "."
        && segment != "..";
    if segment.is_empty() || !single {
        return Err(StorageError::InvalidKey(segment.to_string()));
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// `<millis>-<16 hex>.<ext>`; the extension comes from the original name
pub fn generate_object_name(original_name: &str, now_millis: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let extension = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin")
        .to_ascii_lowercase();
    format!("{}-{}.{}", now_millis, &random[..16], extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_keep_extension() {
        let name = generate_object_name("Resume.PDF", 1_700_000_000_000);
        assert!(name.starts_with("1700000000000-"));
        assert!(name.ends_with(".pdf"));
        let random = name.trim_start_matches("1700000000000-").trim_end_matches(".pdf");
        assert_eq!(random.len(), 16);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn object_names_without_extension_fall_back() {
        assert!(generate_object_name("notes", 1).ends_with(".bin"));
        assert!(generate_object_name("weird.../x", 1).ends_with(".bin"));
    }

    #[test]
    fn rejects_traversal_keys() {
        assert!(validate_segment("../etc").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("1700-abc.pdf").is_ok());
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path(), "http://files.test/");

        let stored = store
            .put("documents", "1-abc.txt", b"hello", "text/plain")
            .await
            .unwrap();
        assert_eq!(stored.size, 5);
        assert_eq!(stored.url, "http://files.test/documents/1-abc.txt");
        assert_eq!(stored.checksum, sha256_hex(b"hello"));
        assert!(dir.path().join("documents/1-abc.txt").exists());

        store.delete("documents", "1-abc.txt").await.unwrap();
        assert!(!dir.path().join("documents/1-abc.txt").exists());
        assert!(store.delete("documents", "1-abc.txt").await.is_err());
    }
}
