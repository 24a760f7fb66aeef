use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphStoreError {
    /// The store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The store rejected the statement (syntax or semantic error).
    #[error("query failed [{code}]: {message}")]
    Query { code: String, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphStoreError {
    /// Whether the statement itself was at fault, as opposed to the store.
    pub fn is_query_error(&self) -> bool {
        matches!(self, GraphStoreError::Query { .. })
    }
}

impl From<reqwest::Error> for GraphStoreError {
    fn from(err: reqwest::Error) -> Self {
        GraphStoreError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for GraphStoreError {
    fn from(err: serde_json::Error) -> Self {
        GraphStoreError::InvalidResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphStoreError>;
