use crate::chunk::{CodeChunk, SearchFilters};
use crate::error::{Result, VectorStoreError};
use codexgraph_embeddings::{Embedder, cosine_similarity};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A search result from the vector store
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: CodeChunk,

    /// Cosine similarity, higher is better
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    chunk: CodeChunk,
    vector: Vec<f32>,
}

/// Brute-force cosine index over embedded code chunks.
///
/// When opened from a path, every `add_chunks` call rewrites the JSON file.
pub struct VectorStore {
    path: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl VectorStore {
    /// Store that lives only in memory.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            path: None,
            embedder,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Open (or create) a JSON-persisted store.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        info!("Opening vector store at {}", path.display());

        let chunks = if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read(path).await?;
            let stored: Vec<StoredChunk> =
                serde_json::from_slice(&content).map_err(|e| VectorStoreError::Load {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            if let Some(first) = stored.first()
                && first.vector.len() != embedder.dimension()
            {
                return Err(VectorStoreError::DimensionMismatch {
                    stored: first.vector.len(),
                    expected: embedder.dimension(),
                });
            }
            stored
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            Vec::new()
        };

        info!("Vector store holds {} chunks", chunks.len());
        Ok(Self {
            path: Some(path.to_path_buf()),
            embedder,
            chunks: RwLock::new(chunks),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Embed and add chunks, persisting when the store has a path.
    pub async fn add_chunks(&self, chunks: Vec<CodeChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        debug!("Adding {} chunks to vector store", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(texts)?;
        if vectors.len() != chunks.len() {
            return Err(VectorStoreError::Embedding(
                codexgraph_embeddings::EmbeddingError::EmbeddingGeneration(format!(
                    "expected {} vectors, got {}",
                    chunks.len(),
                    vectors.len()
                )),
            ));
        }

        let mut stored = self.chunks.write().await;
        stored.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| StoredChunk { chunk, vector }),
        );

        if let Some(path) = &self.path {
            let content = serde_json::to_vec(&*stored)?;
            tokio::fs::write(path, content).await?;
        }
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Top-`k` chunks by cosine similarity among those passing `filters`.
    ///
    /// Ties keep insertion order.
    pub async fn similarity_search(
        &self,
        text: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        if text.trim().is_empty() {
            return Err(VectorStoreError::InvalidQuery("empty query text".into()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_single(text)?;
        let chunks = self.chunks.read().await;

        let mut scored: Vec<(usize, f32)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, stored)| stored.chunk.matches(filters))
            .map(|(idx, stored)| (idx, cosine_similarity(&query_vector, &stored.vector)))
            .collect();

        if scored.is_empty() && !filters.is_empty() {
            warn!("No chunks match filters {filters:?}");
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| SearchResult {
                chunk: chunks[idx].chunk.clone(),
                score,
            })
            .collect();

        debug!("similarity_search('{text}', k={k}) -> {} results", results.len());
        Ok(results)
    }
}
