use crate::GraphStore;
use crate::error::{GraphStoreError, Result};
use crate::row::{GraphNodeRef, GraphRelationshipRef, GraphRow};
use crate::schema::GraphSchemaDescriptor;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};

/// Neo4j HTTP API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// HTTP endpoint, e.g. `http://localhost:7474`
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Database name (Neo4j 4.x+)
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_uri() -> String {
    "http://localhost:7474".to_string()
}

fn default_username() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            username: default_username(),
            password: String::new(),
            database: default_database(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Read queries over the transactional HTTP endpoint (`/db/{database}/tx/commit`).
pub struct Neo4jHttpStore {
    http: reqwest::Client,
    config: Neo4jConfig,
    schema: GraphSchemaDescriptor,
}

impl Neo4jHttpStore {
    pub fn new(config: Neo4jConfig, schema: GraphSchemaDescriptor) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            schema,
        })
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.uri.trim_end_matches('/'),
            self.config.database
        )
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn execute(&self, query: &str) -> Result<Vec<GraphRow>> {
        let started = Instant::now();
        let body = json!({
            "statements": [{
                "statement": query,
                "resultDataContents": ["row", "graph"],
            }]
        });

        let resp = self
            .http
            .post(self.commit_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!("Neo4j returned HTTP {status}");
            return Err(GraphStoreError::Connection(format!("HTTP {status}: {text}")));
        }

        let rows = parse_commit_response(&text)?;
        debug!(
            "Neo4j query returned {} rows in {}ms",
            rows.len(),
            started.elapsed().as_millis()
        );
        Ok(rows)
    }

    fn schema(&self) -> &GraphSchemaDescriptor {
        &self.schema
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<ResultData>,
}

#[derive(Deserialize)]
struct ResultData {
    #[serde(default)]
    row: Vec<Value>,
    #[serde(default)]
    graph: Option<ResultGraph>,
}

#[derive(Deserialize, Default)]
struct ResultGraph {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: Value,
    #[serde(default)]
    element_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelationship {
    id: Value,
    #[serde(default)]
    element_id: Option<String>,
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(default)]
    start_node: Option<Value>,
    #[serde(default)]
    end_node: Option<Value>,
    #[serde(default)]
    start_node_element_id: Option<String>,
    #[serde(default)]
    end_node_element_id: Option<String>,
}

#[derive(Deserialize)]
struct StatementError {
    code: String,
    message: String,
}

/// Identifier as text; Neo4j sends ids as strings or numbers depending on version.
fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a `tx/commit` response body into rows.
pub fn parse_commit_response(body: &str) -> Result<Vec<GraphRow>> {
    let response: CommitResponse = serde_json::from_str(body)?;

    if let Some(error) = response.errors.into_iter().next() {
        return Err(GraphStoreError::Query {
            code: error.code,
            message: error.message,
        });
    }

    let mut rows = Vec::new();
    for result in response.results {
        for data in result.data {
            let columns: Map<String, Value> =
                result.columns.iter().cloned().zip(data.row).collect();
            let graph = data.graph.unwrap_or_default();

            let nodes = graph
                .nodes
                .into_iter()
                .map(|n| GraphNodeRef {
                    element_id: n.element_id.unwrap_or_else(|| id_text(&n.id)),
                    labels: n.labels,
                    properties: n.properties,
                })
                .collect();
            let relationships = graph
                .relationships
                .into_iter()
                .map(|r| GraphRelationshipRef {
                    element_id: r.element_id.unwrap_or_else(|| id_text(&r.id)),
                    rel_type: r.rel_type,
                    start_node: r.start_node_element_id.or(r.start_node.as_ref().map(id_text)),
                    end_node: r.end_node_element_id.or(r.end_node.as_ref().map(id_text)),
                })
                .collect();

            rows.push(GraphRow {
                columns,
                nodes,
                relationships,
            });
        }
    }
    Ok(rows)
}
