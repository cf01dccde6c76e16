use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use marquee_core::{ProofArtifact, ProofStorage, StorageError};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Stores proofs as base64 data URLs in the row itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineProofStorage;

impl InlineProofStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProofStorage for InlineProofStorage {
    async fn store(&self, _key: &str, artifact: &ProofArtifact) -> Result<String, StorageError> {
        Ok(format!("data:{};base64,{}", artifact.mimetype, STANDARD.encode(&artifact.bytes)))
    }

    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>, StorageError> {
        // Older rows carry bare base64 without the data URL prefix.
        let payload = match location.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((_, data)) => data,
                None => return Err(StorageError::Corrupt("data URL is not base64".to_string())),
            },
            None => location,
        };

        STANDARD
            .decode(payload.trim())
            .map(Some)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn remove(&self, _location: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Stores proofs as files under a root directory. Locations are paths
/// relative to that root.
#[derive(Debug, Clone)]
pub struct FsProofStorage {
    root: PathBuf,
}

impl FsProofStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(location);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StorageError::Corrupt(format!("refusing path outside storage root: {}", location)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ProofStorage for FsProofStorage {
    async fn store(&self, key: &str, artifact: &ProofArtifact) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        debug!(path = %path.display(), bytes = artifact.bytes.len(), "Stored payment proof");
        Ok(key.to_string())
    }

    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(location)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Payment proof file missing");
                Ok(None)
            }
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    async fn remove(&self, location: &str) -> Result<(), StorageError> {
        let path = self.resolve(location)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn artifact() -> ProofArtifact {
        ProofArtifact::new(vec![0x89, 0x50, 0x4e, 0x47], "transfer.png", "image/png")
    }

    #[tokio::test]
    async fn test_inline_storage() {
        let storage = InlineProofStorage::new();
        let location = storage.store("ignored", &artifact()).await.unwrap();
        assert!(location.starts_with("data:image/png;base64,"));
        assert_eq!(storage.fetch(&location).await.unwrap(), Some(artifact().bytes));

        // bare base64 from older rows
        let bare = STANDARD.encode([1u8, 2, 3]);
        assert_eq!(storage.fetch(&bare).await.unwrap(), Some(vec![1, 2, 3]));

        assert!(matches!(storage.fetch("data:image/png,plain").await, Err(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_filesystem_storage() {
        let root = std::env::temp_dir().join(format!("marquee-proofs-{}", Uuid::new_v4()));
        let storage = FsProofStorage::new(&root);

        let location = storage.store("bookings/abc.png", &artifact()).await.unwrap();
        assert_eq!(location, "bookings/abc.png");
        assert_eq!(storage.fetch(&location).await.unwrap(), Some(artifact().bytes));

        storage.remove(&location).await.unwrap();
        assert_eq!(storage.fetch(&location).await.unwrap(), None);
        // Removing twice is fine.
        storage.remove(&location).await.unwrap();

        assert!(storage.fetch("../secrets").await.is_err());
        assert!(storage.store("/etc/passwd", &artifact()).await.is_err());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
