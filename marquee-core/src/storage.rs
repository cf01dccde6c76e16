use async_trait::async_trait;

/// An uploaded payment proof as received from the client.
#[derive(Debug, Clone)]
pub struct ProofArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mimetype: String,
}

impl ProofArtifact {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, mimetype: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            mimetype: mimetype.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mimetype.trim().to_ascii_lowercase().starts_with("image/")
    }

    /// File extension taken from the client filename, or derived from the mimetype.
    pub fn extension(&self) -> String {
        let from_name = self
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

        match from_name {
            Some(ext) => ext.to_ascii_lowercase(),
            None => match self.mimetype.to_ascii_lowercase().as_str() {
                "image/jpeg" | "image/jpg" => "jpg".to_string(),
                "image/png" => "png".to_string(),
                "image/gif" => "gif".to_string(),
                "image/webp" => "webp".to_string(),
                _ => "bin".to_string(),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Proof storage unavailable: {0}")]
    Unavailable(String),
    #[error("Stored proof is unreadable: {0}")]
    Corrupt(String),
}

/// Blob storage for payment proof images.
#[async_trait]
pub trait ProofStorage: Send + Sync {
    /// Persists the artifact and returns its location.
    async fn store(&self, key: &str, artifact: &ProofArtifact) -> Result<String, StorageError>;

    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn remove(&self, location: &str) -> Result<(), StorageError>;
}
