use crate::cypher::variable_labels;
use crate::error::{CollaboratorTimeout, GraphExecutionError};
use crate::evidence::{Channel, EvidencePayload, EvidenceRecord, Locator};
use crate::intent::{EntityKind, normalize_relationship};
use crate::translator::FormalQuery;
use codexgraph_graph_store::{CodeLocation, GraphRow, GraphStore, GraphStoreError};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why the structural channel did not run in an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ChannelDisabled,
    IntentFailed,
    TranslationFailed,
}

/// What happened on the structural channel in one iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GraphOutcome {
    Executed { rows: usize },
    Failed { error: String, unavailable: bool },
    Skipped { reason: SkipReason },
}

impl GraphOutcome {
    /// A structural attempt that produced nothing usable: the query failed or
    /// could not be written.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            GraphOutcome::Failed { .. }
                | GraphOutcome::Skipped {
                    reason: SkipReason::TranslationFailed
                }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, GraphOutcome::Failed { unavailable: true, .. })
    }

    pub fn describe(&self) -> String {
        match self {
            GraphOutcome::Executed { rows } => format!("returned {rows} row(s)"),
            GraphOutcome::Failed { error, .. } => format!("failed: {error}"),
            GraphOutcome::Skipped { reason } => match reason {
                SkipReason::ChannelDisabled => "skipped (channel disabled)".to_string(),
                SkipReason::IntentFailed => "skipped (intent extraction failed)".to_string(),
                SkipReason::TranslationFailed => "skipped (translation failed)".to_string(),
            },
        }
    }
}

/// Runs validated formal queries and turns rows into evidence.
pub struct GraphExecutor {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl GraphExecutor {
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Execute `query`. Zero rows is a success. Availability failures are
    /// retried once; rejected queries are not.
    pub async fn execute(
        &self,
        query: &FormalQuery,
        iteration: usize,
    ) -> Result<Vec<EvidenceRecord>, GraphExecutionError> {
        let rows = match self.run_once(&query.text).await {
            Err(err) if err.is_unavailability() => {
                warn!(error = %err, "graph store unavailable, retrying once");
                self.run_once(&query.text).await?
            }
            other => other?,
        };

        let var_labels = variable_labels(&query.text);
        Ok(rows
            .iter()
            .map(|row| row_to_record(row, query, &var_labels, iteration))
            .collect())
    }

    async fn run_once(&self, text: &str) -> Result<Vec<GraphRow>, GraphExecutionError> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.store.execute(text)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let rows = match outcome {
            Err(_) => {
                return Err(GraphExecutionError::Timeout(CollaboratorTimeout {
                    collaborator: "graph store".to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }));
            }
            Ok(Err(GraphStoreError::Query { code, message })) => {
                return Err(GraphExecutionError::Query { code, message });
            }
            Ok(Err(err)) => return Err(GraphExecutionError::Unavailable(err.to_string())),
            Ok(Ok(rows)) => rows,
        };
        debug!(rows = rows.len(), latency_ms, "graph query executed");
        Ok(rows)
    }
}

fn row_to_record(
    row: &GraphRow,
    query: &FormalQuery,
    var_labels: &BTreeMap<String, String>,
    iteration: usize,
) -> EvidenceRecord {
    let locations = row.code_locations();
    let location = locations.first().cloned();
    let node_ids: Vec<String> = row.nodes.iter().map(|n| n.element_id.clone()).collect();
    let locator = row_locator(row, &locations);

    EvidenceRecord {
        channel: Channel::Graph,
        locator,
        payload: EvidencePayload::GraphRow {
            columns: row.columns.clone(),
            labels: row.labels().into_iter().map(str::to_string).collect(),
            node_ids,
        },
        relevance: 1.0,
        supplementary_score: None,
        entity_kinds: row_kinds(row, query, var_labels),
        relationships: row_relationships(row),
        location,
        iteration,
    }
}

/// A row naming a single entity is keyed by that entity's file range or
/// element id, so it can meet the same entity from the semantic channel.
/// Rows that join several entities are keyed by all of them.
fn row_locator(row: &GraphRow, locations: &[CodeLocation]) -> Locator {
    let ids = row.node_ids();
    match (locations, ids.as_slice()) {
        ([location], [] | [_]) => Locator::from(location),
        ([], [id]) => Locator::GraphElement { id: id.to_string() },
        ([], []) => Locator::GraphElement {
            id: content_hash(row),
        },
        _ => {
            let mut parts: Vec<String> = locations
                .iter()
                .map(|l| Locator::from(l).to_string())
                .collect();
            parts.extend(ids.iter().map(|id| id.to_string()));
            Locator::GraphElement {
                id: parts.join("+"),
            }
        }
    }
}

fn content_hash(row: &GraphRow) -> String {
    // Map keys are ordered, so the serialization is canonical.
    let canonical = Value::Object(row.columns.clone()).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("sha256:{digest:x}")
}

fn strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn row_kinds(
    row: &GraphRow,
    query: &FormalQuery,
    var_labels: &BTreeMap<String, String>,
) -> Vec<EntityKind> {
    let mut kinds: Vec<EntityKind> = row
        .labels()
        .into_iter()
        .filter_map(EntityKind::from_label)
        .collect();

    for (key, value) in &row.columns {
        let key_lower = key.to_lowercase();
        if matches!(key_lower.as_str(), "type" | "kind" | "label" | "labels")
            || key_lower.starts_with("labels(")
        {
            kinds.extend(
                strings(value)
                    .into_iter()
                    .filter_map(|s| EntityKind::from_label(s).or_else(|| EntityKind::parse(s))),
            );
        } else if let Some((var, _)) = key.split_once('.')
            && let Some(label) = var_labels.get(var)
            && let Some(kind) = EntityKind::from_label(label)
        {
            kinds.push(kind);
        }
    }

    if kinds.is_empty()
        && let [only] = query.labels.as_slice()
        && let Some(kind) = EntityKind::from_label(only)
    {
        kinds.push(kind);
    }

    kinds.sort();
    kinds.dedup();
    kinds
}

fn row_relationships(row: &GraphRow) -> Vec<String> {
    let mut rels: Vec<String> = row
        .relationships
        .iter()
        .map(|r| r.rel_type.clone())
        .collect();

    for (key, value) in &row.columns {
        let key_lower = key.to_lowercase();
        if key_lower.starts_with("type(")
            || matches!(key_lower.as_str(), "relationship" | "rel_type" | "relation")
        {
            rels.extend(
                strings(value)
                    .into_iter()
                    .map(|s| normalize_relationship(s).map_or_else(|| s.to_uppercase(), str::to_string)),
            );
        }
    }

    rels.sort();
    rels.dedup();
    rels
}
