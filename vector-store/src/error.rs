use thiserror::Error;

/// Errors that can occur during vector store operations
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Persisted index could not be loaded
    #[error("Failed to load vector store from {path}: {reason}")]
    Load { path: String, reason: String },

    /// Stored vectors do not match the embedder in use
    #[error("Dimension mismatch: index has {stored}, embedder produces {expected}")]
    DimensionMismatch { stored: usize, expected: usize },

    /// Invalid query provided
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] codexgraph_embeddings::EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
