use crate::evidence::{Channel, EvidenceRecord, EvidenceSet, Locator};
use crate::history::IterationHistory;
use crate::intent::EntityKind;
use crate::pipeline::PipelineState;
use crate::sufficiency::SufficiencyVerdict;
use codexgraph_graph_store::CodeLocation;
use serde::Serialize;

/// How the session left the refinement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Sufficient,
    /// The iteration ceiling was hit before the verdict passed
    BudgetExhausted,
}

/// Pointer from the answer back to one evidence record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// 1-based, matches `[n]` markers in the answer text
    pub index: usize,
    pub channel: Channel,
    pub locator: Locator,
    pub title: String,
    pub relevance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplementary_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<CodeLocation>,
}

impl Citation {
    pub fn from_record(index: usize, record: &EvidenceRecord) -> Self {
        Self {
            index,
            channel: record.channel,
            locator: record.locator.clone(),
            title: record.title(),
            relevance: record.relevance,
            supplementary_score: record.supplementary_score,
            location: record.location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalAnswer {
    pub query: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    /// True when the budget ran out before the evidence was judged sufficient
    pub partial: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub elapsed_ms: u64,
    /// Kinds the original intent asked for that nothing was found for
    pub missing_kinds: Vec<EntityKind>,
    pub verdict: SufficiencyVerdict,
    pub evidence: EvidenceSet,
    pub history: IterationHistory,
    pub state_trace: Vec<PipelineState>,
}
