use crate::GraphStore;
use crate::error::{GraphStoreError, Result};
use crate::row::GraphRow;
use crate::schema::GraphSchemaDescriptor;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One scripted outcome of [`FakeGraphStore::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum GraphReply {
    Rows(Vec<GraphRow>),
    /// Fails with [`GraphStoreError::Query`] carrying this message.
    Error(String),
    /// Sleeps, then returns the rows.
    Delay(Duration, Vec<GraphRow>),
}

/// Scripted in-memory graph store. Replies are consumed in order; the last
/// default reply (initially zero rows) repeats once the script runs out.
#[derive(Debug)]
pub struct FakeGraphStore {
    schema: GraphSchemaDescriptor,
    script: Mutex<VecDeque<GraphReply>>,
    default_reply: GraphReply,
    executed: Mutex<Vec<String>>,
}

impl Default for FakeGraphStore {
    fn default() -> Self {
        Self::new(GraphSchemaDescriptor::code_property_graph())
    }
}

impl FakeGraphStore {
    pub fn new(schema: GraphSchemaDescriptor) -> Self {
        Self {
            schema,
            script: Mutex::new(VecDeque::new()),
            default_reply: GraphReply::Rows(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, reply: GraphReply) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    pub fn with_default(mut self, reply: GraphReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Queries received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn execute(&self, query: &str) -> Result<Vec<GraphRow>> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        let reply = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());

        match reply {
            GraphReply::Rows(rows) => Ok(rows),
            GraphReply::Error(message) => Err(GraphStoreError::Query {
                code: "Fake.ClientError".to_string(),
                message,
            }),
            GraphReply::Delay(delay, rows) => {
                tokio::time::sleep(delay).await;
                Ok(rows)
            }
        }
    }

    fn schema(&self) -> &GraphSchemaDescriptor {
        &self.schema
    }
}
