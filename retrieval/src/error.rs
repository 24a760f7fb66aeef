use crate::evidence::EvidenceSet;
use crate::history::IterationRecord;
use codexgraph_llm::LlmError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A collaborator call exceeded the configured timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator} call timed out after {timeout_ms}ms")]
pub struct CollaboratorTimeout {
    pub collaborator: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum IntentExtractionError {
    #[error("intent response unparsable after retry: {0}")]
    Unparsable(String),

    #[error(transparent)]
    Timeout(#[from] CollaboratorTimeout),

    #[error("language model failed: {0}")]
    Collaborator(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum TranslationError {
    /// The formal query failed validation (or could not be parsed) twice.
    #[error("formal query rejected after regeneration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Timeout(#[from] CollaboratorTimeout),

    #[error("language model failed: {0}")]
    Collaborator(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum GraphExecutionError {
    /// The store rejected the query. Retrying the same text will not help.
    #[error("query rejected [{code}]: {message}")]
    Query { code: String, message: String },

    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Timeout(#[from] CollaboratorTimeout),
}

impl GraphExecutionError {
    /// True when the store itself could not be reached or did not answer.
    pub fn is_unavailability(&self) -> bool {
        !matches!(self, GraphExecutionError::Query { .. })
    }
}

#[derive(Debug, Error)]
pub enum SemanticRetrievalError {
    #[error("vector index failed: {0}")]
    Index(String),

    #[error(transparent)]
    Timeout(#[from] CollaboratorTimeout),
}

/// Why a session stopped without an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    InvalidConfig(String),
    InvalidQuery(String),
    /// Every enabled channel failed for availability reasons in one iteration.
    CollaboratorsUnavailable,
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::InvalidConfig(detail) => write!(f, "invalid configuration: {detail}"),
            AbortReason::InvalidQuery(detail) => write!(f, "invalid query: {detail}"),
            AbortReason::CollaboratorsUnavailable => {
                f.write_str("every enabled retrieval channel was unavailable")
            }
            AbortReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Unrecoverable session failure. Carries whatever the session had gathered.
#[derive(Debug, Error)]
#[error("retrieval aborted: {reason}")]
pub struct PipelineAbortedError {
    pub reason: AbortReason,
    pub last_iteration: Option<Box<IterationRecord>>,
    pub evidence: EvidenceSet,
}

impl PipelineAbortedError {
    pub fn new(reason: AbortReason) -> Self {
        Self {
            reason,
            last_iteration: None,
            evidence: EvidenceSet::default(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineAbortedError>;
