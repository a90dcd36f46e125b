use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// The reference table is missing, unreadable or empty after cleaning.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Embedding service unreachable at {0}")]
    EmbeddingUnavailable(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Corrupt index artifact: {0}")]
    CorruptIndex(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Reference table error: {0}")]
    TableError(#[from] csv::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

impl VectorStoreError {
    /// Whether the failure came from the embedding service rather than local state.
    #[must_use]
    pub const fn is_embedding_failure(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingError(_) | Self::EmbeddingUnavailable(_)
        )
    }
}
