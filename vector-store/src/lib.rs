//! # CodexGraph Vector Store
//!
//! Vector-index collaborator for the semantic retrieval channel: code chunks
//! embedded through any [`codexgraph_embeddings::Embedder`], ranked by cosine
//! similarity after metadata filtering, and persisted as JSON.
//!
//! ## Example
//!
//! ```no_run
//! use codexgraph_embeddings::HashingEmbedder;
//! use codexgraph_vector_store::{SearchFilters, VectorStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), codexgraph_vector_store::VectorStoreError> {
//! let store = VectorStore::open(
//!     Path::new(".codexgraph/vectors.json"),
//!     Arc::new(HashingEmbedder::default()),
//! )
//! .await?;
//! let hits = store
//!     .similarity_search("async function", 5, &SearchFilters::default())
//!     .await?;
//! println!("Found {} similar code snippets", hits.len());
//! # Ok(())
//! # }
//! ```

mod chunk;
mod error;
mod store;

pub use chunk::{ChunkMetadata, CodeChunk, SearchFilters};
pub use error::{Result, VectorStoreError};
pub use store::{SearchResult, VectorStore};
