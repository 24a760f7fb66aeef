//! # CodexGraph Embeddings
//!
//! Text embedding capability used by the semantic retrieval channel.
//!
//! Two implementations of [`Embedder`] are provided:
//!
//! - [`EmbeddingService`]: Nomic-embed-text-v1.5 (or MiniLM) via fastembed-rs,
//!   running locally on ONNX Runtime. Models are downloaded on first use.
//! - [`HashingEmbedder`]: a deterministic hashed bag-of-tokens embedder. It
//!   needs no model files, which makes it the embedder of choice for tests
//!   and for offline indexes.
//!
//! ## Example
//!
//! ```no_run
//! use codexgraph_embeddings::{Embedder, HashingEmbedder};
//!
//! let embedder = HashingEmbedder::default();
//! let vectors = embedder.embed(vec!["fn hello() {}".to_string()]).unwrap();
//! assert_eq!(vectors[0].len(), embedder.dimension());
//! ```

mod error;
mod hashing;
mod service;

pub use error::EmbeddingError;
pub use hashing::HashingEmbedder;
pub use service::EmbeddingConfig;
pub use service::EmbeddingModelType;
pub use service::EmbeddingService;

/// Default embedding dimension for Nomic-embed-text-v1.5
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Compact embedding dimension (using Matryoshka truncation)
pub const COMPACT_EMBEDDING_DIM: usize = 256;

/// Anything that turns text into fixed-size vectors.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimension of the vectors produced by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn embed_single(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embeddings = self.embed(vec![text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingGeneration("No embedding generated".into()))
    }
}

/// Cosine similarity of two vectors; zero when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
