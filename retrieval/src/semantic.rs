use crate::error::{CollaboratorTimeout, SemanticRetrievalError};
use crate::evidence::{Channel, EvidencePayload, EvidenceRecord, Locator};
use crate::intent::{EntityKind, StructuredIntent};
use crate::query::Query;
use async_trait::async_trait;
use codexgraph_graph_store::CodeLocation;
use codexgraph_vector_store::{SearchFilters, SearchResult, VectorStore, VectorStoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Similarity search over embedded code snippets.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn similarity_search(
        &self,
        text: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn similarity_search(
        &self,
        text: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        VectorStore::similarity_search(self, text, k, filters).await
    }
}

/// What happened on the semantic channel in one iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SemanticOutcome {
    Retrieved { records: usize, below_min_score: usize },
    Failed { error: String },
    Skipped,
}

impl SemanticOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SemanticOutcome::Failed { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            SemanticOutcome::Retrieved { records, .. } => format!("returned {records} snippet(s)"),
            SemanticOutcome::Failed { error } => format!("failed: {error}"),
            SemanticOutcome::Skipped => "skipped".to_string(),
        }
    }
}

/// Similarity channel: query text plus intent focus, filtered by intent scope.
pub struct SemanticRetriever {
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
    min_score: f32,
}

impl SemanticRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, timeout: Duration, min_score: f32) -> Self {
        Self {
            index,
            timeout,
            min_score,
        }
    }

    /// Returns the records plus how many hits fell below the minimum score.
    pub async fn retrieve(
        &self,
        query: &Query,
        intent: &StructuredIntent,
        top_k: usize,
        iteration: usize,
    ) -> Result<(Vec<EvidenceRecord>, usize), SemanticRetrievalError> {
        let text = match &intent.focus {
            Some(focus) if !query.text().contains(focus.as_str()) => {
                format!("{} {focus}", query.text())
            }
            _ => query.text().to_string(),
        };
        let filters = SearchFilters {
            language: intent.scope.language.clone(),
            path_prefix: intent.scope.path_prefix.clone(),
        };

        let hits = match self.search_once(&text, top_k, &filters).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "vector index failed, retrying once");
                self.search_once(&text, top_k, &filters).await?
            }
        };

        let total = hits.len();
        let records: Vec<EvidenceRecord> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.min_score)
            .map(|hit| hit_to_record(hit, iteration))
            .collect();
        let dropped = total - records.len();
        Ok((records, dropped))
    }

    async fn search_once(
        &self,
        text: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SemanticRetrievalError> {
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.timeout, self.index.similarity_search(text, top_k, filters))
                .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => Err(SemanticRetrievalError::Timeout(CollaboratorTimeout {
                collaborator: "vector index".to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })),
            Ok(Err(err)) => Err(SemanticRetrievalError::Index(err.to_string())),
            Ok(Ok(hits)) => {
                debug!(hits = hits.len(), top_k, latency_ms, "semantic search");
                Ok(hits)
            }
        }
    }
}

fn hit_to_record(hit: SearchResult, iteration: usize) -> EvidenceRecord {
    let chunk = hit.chunk;
    let start_line = chunk.start_line as u64;
    let end_line = chunk.end_line as u64;
    let entity_kinds: Vec<EntityKind> = chunk
        .metadata
        .kind
        .as_deref()
        .and_then(EntityKind::parse)
        .into_iter()
        .collect();

    EvidenceRecord {
        channel: Channel::Semantic,
        locator: Locator::file_range(&chunk.path, start_line, end_line),
        location: Some(CodeLocation {
            path: chunk.path.clone(),
            start_line,
            end_line,
        }),
        payload: EvidencePayload::Snippet {
            path: chunk.path,
            language: chunk.metadata.language,
            content: chunk.content,
        },
        relevance: f64::from(hit.score.clamp(0.0, 1.0)),
        supplementary_score: None,
        entity_kinds,
        relationships: Vec::new(),
        iteration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Scope;
    use codexgraph_embeddings::HashingEmbedder;
    use codexgraph_vector_store::CodeChunk;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn store() -> Arc<VectorStore> {
        let store = VectorStore::in_memory(Arc::new(HashingEmbedder::default()));
        store
            .add_chunks(vec![
                CodeChunk::new(
                    "app/auth/login.py",
                    1,
                    12,
                    "def login(user, password): check password hash",
                )
                .with_language("python")
                .with_kind("function"),
                CodeChunk::new(
                    "app/models/user.py",
                    1,
                    30,
                    "class User: name email password_hash",
                )
                .with_language("python")
                .with_kind("class"),
                CodeChunk::new("web/src/login.ts", 1, 8, "export function login() {}")
                    .with_language("typescript")
                    .with_kind("function"),
            ])
            .await
            .unwrap();
        Arc::new(store)
    }

    struct FailingIndex {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FailingIndex {
        async fn similarity_search(
            &self,
            _text: &str,
            _k: usize,
            _filters: &SearchFilters,
        ) -> Result<Vec<SearchResult>, VectorStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(VectorStoreError::InvalidQuery("index offline".into()))
        }
    }

    #[tokio::test]
    async fn test_scope_filters_and_kinds() {
        let retriever = SemanticRetriever::new(store().await, Duration::from_secs(5), 0.0);
        let intent = StructuredIntent {
            scope: Scope {
                path_prefix: None,
                language: Some("python".into()),
            },
            ..Default::default()
        };

        let (records, dropped) = retriever
            .retrieve(&Query::new("login password"), &intent, 10, 1)
            .await
            .unwrap();

        assert_eq!(dropped, 0);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.channel == Channel::Semantic));
        assert!(records.iter().all(|r| r.has_source_context()));
        assert_eq!(records[0].locator, Locator::file_range("app/auth/login.py", 1, 12));
        assert_eq!(records[0].entity_kinds, vec![EntityKind::Function]);
    }

    #[tokio::test]
    async fn test_min_score_drops_weak_hits() {
        let retriever = SemanticRetriever::new(store().await, Duration::from_secs(5), 0.99);

        let (records, dropped) = retriever
            .retrieve(
                &Query::new("completely unrelated words"),
                &StructuredIntent::default(),
                10,
                1,
            )
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(dropped, 3);
    }

    #[tokio::test]
    async fn test_index_failure_retried_once() {
        let index = Arc::new(FailingIndex {
            calls: AtomicUsize::new(0),
        });
        let retriever = SemanticRetriever::new(index.clone(), Duration::from_secs(5), 0.0);

        let result = retriever
            .retrieve(&Query::new("login"), &StructuredIntent::default(), 5, 1)
            .await;

        assert!(matches!(result, Err(SemanticRetrievalError::Index(_))));
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    }
}
