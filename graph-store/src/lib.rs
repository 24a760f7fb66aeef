/*!
# CodexGraph Graph Store

Graph-store collaborator: executes read-only Cypher against a code property
graph and describes that graph's schema for query translation.

- [`Neo4jHttpStore`] talks to Neo4j over the transactional HTTP API.
- [`FakeGraphStore`] replays scripted rows and errors.
- [`CodeLocation`] decodes the indexer's `<CODE>{...}</CODE>` references.
*/

mod error;
mod fake;
mod location;
mod neo4j;
mod row;
mod schema;

pub use error::{GraphStoreError, Result};
pub use fake::{FakeGraphStore, GraphReply};
pub use location::CodeLocation;
pub use neo4j::{Neo4jConfig, Neo4jHttpStore, parse_commit_response};
pub use row::{GraphNodeRef, GraphRelationshipRef, GraphRow};
pub use schema::{GraphSchemaDescriptor, IndexedProperty, NodeLabelSchema, RelationshipSchema};

use async_trait::async_trait;

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run `query` and return every row. Zero rows is a success.
    async fn execute(&self, query: &str) -> Result<Vec<GraphRow>>;

    fn schema(&self) -> &GraphSchemaDescriptor;
}
