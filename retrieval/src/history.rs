use crate::evidence::{EvidenceRecord, Locator};
use crate::executor::GraphOutcome;
use crate::intent::StructuredIntent;
use crate::semantic::SemanticOutcome;
use crate::sufficiency::SufficiencyVerdict;
use crate::translator::FormalQuery;
use serde::Serialize;

/// Everything one round produced, kept for refinement and reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// 1-based
    pub index: usize,
    pub intent: Option<StructuredIntent>,
    pub formal_query: Option<FormalQuery>,
    pub graph: GraphOutcome,
    pub semantic: SemanticOutcome,
    pub added: Vec<EvidenceRecord>,
    /// Evidence dropped when acting on a pivot directive
    pub discarded: Vec<Locator>,
    pub verdict: SufficiencyVerdict,
    /// Intent or translation failures that ended the round early
    pub failures: Vec<String>,
}

/// Ordered iteration records of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IterationHistory {
    records: Vec<IterationRecord>,
}

impl IterationHistory {
    pub fn push(&mut self, record: IterationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent successfully extracted intent.
    pub fn last_intent(&self) -> Option<&StructuredIntent> {
        self.records.iter().rev().find_map(|r| r.intent.as_ref())
    }

    /// First successfully extracted intent.
    pub fn original_intent(&self) -> Option<&StructuredIntent> {
        self.records.iter().find_map(|r| r.intent.as_ref())
    }

    /// Rounds in which the structural channel failed and succeeded.
    pub fn graph_tally(&self) -> (usize, usize) {
        self.records
            .iter()
            .fold((0, 0), |(failed, succeeded), r| match &r.graph {
                outcome if outcome.is_failure() => (failed + 1, succeeded),
                GraphOutcome::Executed { .. } => (failed, succeeded + 1),
                _ => (failed, succeeded),
            })
    }
}

impl<'a> IntoIterator for &'a IterationHistory {
    type Item = &'a IterationRecord;
    type IntoIter = std::slice::Iter<'a, IterationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
