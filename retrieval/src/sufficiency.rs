//! Scores accumulated evidence and decides whether to keep refining.
//!
//! Four axes, each in `[0, 1]`:
//!
//! - **coverage**: per target kind, 1.0 with graph evidence, 0.5 with only
//!   semantic evidence, 0.0 otherwise. Without targets, 1.0 for any evidence.
//! - **depth**: half the share of records with relationship context plus
//!   half the share with source context.
//! - **accuracy**: translator confidence when the latest graph query returned
//!   rows, half of it on zero rows, 0.0 on failure, and the mean semantic
//!   relevance when no graph query was attempted.
//! - **completeness**: 1.0 for unambiguous intents, otherwise rises with the
//!   number of distinct source files and entity kinds (saturating at five).
//!
//! The verdict passes when the weighted mean reaches the threshold and
//! coverage reaches the floor. Evaluation is pure.

use crate::config::{PipelineConfig, SufficiencyWeights};
use crate::evidence::{Channel, EvidenceSet};
use crate::executor::{GraphOutcome, SkipReason};
use crate::intent::{EntityKind, StructuredIntent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

const COMPLETENESS_SATURATION: f64 = 5.0;

/// Instruction for the next round when the verdict fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementDirective {
    /// Broaden: more kinds, looser filters
    Expand,
    /// Tighten scope and filters
    Narrow,
    /// Structural channel keeps failing; lean on semantic retrieval
    Pivot,
}

impl fmt::Display for RefinementDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefinementDirective::Expand => f.write_str("expand"),
            RefinementDirective::Narrow => f.write_str("narrow"),
            RefinementDirective::Pivot => f.write_str("pivot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisScores {
    pub coverage: f64,
    pub depth: f64,
    pub accuracy: f64,
    pub completeness: f64,
}

impl AxisScores {
    fn weighted_mean(&self, w: &SufficiencyWeights) -> f64 {
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }
        (self.coverage * w.coverage
            + self.depth * w.depth
            + self.accuracy * w.accuracy
            + self.completeness * w.completeness)
            / total
    }

    /// Name and value of the lowest axis. Ties resolve in axis order.
    fn lowest(&self) -> (&'static str, f64) {
        [
            ("coverage", self.coverage),
            ("depth", self.depth),
            ("accuracy", self.accuracy),
            ("completeness", self.completeness),
        ]
        .into_iter()
        .fold(("coverage", f64::INFINITY), |lowest, axis| {
            if axis.1 < lowest.1 { axis } else { lowest }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SufficiencyVerdict {
    pub scores: AxisScores,
    pub overall: f64,
    pub passed: bool,
    /// Present only when the verdict failed
    pub directive: Option<RefinementDirective>,
    pub rationale: String,
    /// Target kinds with no evidence from either channel
    pub missing_kinds: Vec<EntityKind>,
}

/// Per-iteration facts the evaluator needs besides the evidence itself.
#[derive(Debug, Clone, Copy)]
pub struct IterationSignals<'a> {
    pub intent: Option<&'a StructuredIntent>,
    /// Translator confidence for this round's formal query
    pub confidence: Option<f64>,
    pub graph: &'a GraphOutcome,
    pub graph_enabled: bool,
    /// Failed structural rounds so far, this one included
    pub graph_failures: usize,
    /// Structural rounds that executed, this one included
    pub graph_successes: usize,
}

#[derive(Debug, Clone)]
pub struct SufficiencyEvaluator {
    threshold: f64,
    coverage_floor: f64,
    weights: SufficiencyWeights,
}

impl SufficiencyEvaluator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            threshold: config.sufficiency_threshold,
            coverage_floor: config.coverage_floor,
            weights: config.weights,
        }
    }

    pub fn evaluate(&self, evidence: &EvidenceSet, signals: &IterationSignals<'_>) -> SufficiencyVerdict {
        let targets: &[EntityKind] = signals
            .intent
            .map(|i| i.targets.as_slice())
            .unwrap_or_default();

        let scores = AxisScores {
            coverage: coverage(evidence, targets),
            depth: depth(evidence),
            accuracy: accuracy(evidence, signals),
            completeness: completeness(evidence, signals.intent),
        };
        let overall = scores.weighted_mean(&self.weights);
        let passed = overall >= self.threshold && scores.coverage >= self.coverage_floor;

        let present = evidence.kinds();
        let missing_kinds: Vec<EntityKind> = targets
            .iter()
            .copied()
            .filter(|k| !present.contains(k))
            .collect();

        let directive = (!passed).then(|| self.directive(&scores, signals));
        let rationale = self.rationale(&scores, overall, passed, &missing_kinds, signals);

        SufficiencyVerdict {
            scores,
            overall,
            passed,
            directive,
            rationale,
            missing_kinds,
        }
    }

    fn directive(&self, scores: &AxisScores, signals: &IterationSignals<'_>) -> RefinementDirective {
        if signals.graph_enabled && signals.graph_failures > signals.graph_successes {
            return RefinementDirective::Pivot;
        }
        if scores.coverage < self.coverage_floor || scores.lowest().0 == "coverage" {
            return RefinementDirective::Expand;
        }
        if scores.depth < self.threshold && scores.coverage >= self.threshold {
            return RefinementDirective::Narrow;
        }
        RefinementDirective::Expand
    }

    fn rationale(
        &self,
        scores: &AxisScores,
        overall: f64,
        passed: bool,
        missing_kinds: &[EntityKind],
        signals: &IterationSignals<'_>,
    ) -> String {
        let mut parts = vec![format!(
            "overall {overall:.2} {} threshold {:.2}",
            if overall >= self.threshold { "meets" } else { "below" },
            self.threshold
        )];
        if scores.coverage < self.coverage_floor {
            parts.push(format!(
                "coverage {:.2} below floor {:.2}",
                scores.coverage, self.coverage_floor
            ));
        }
        if !passed {
            let (axis, value) = scores.lowest();
            parts.push(format!("weakest axis {axis} {value:.2}"));
            if signals.graph_enabled && signals.graph_failures > 0 {
                parts.push(format!(
                    "graph rounds failed {} / succeeded {}",
                    signals.graph_failures, signals.graph_successes
                ));
            }
        }
        if !missing_kinds.is_empty() {
            let names: Vec<String> = missing_kinds.iter().map(ToString::to_string).collect();
            parts.push(format!("no evidence for {}", names.join(", ")));
        }
        parts.join("; ")
    }
}

fn coverage(evidence: &EvidenceSet, targets: &[EntityKind]) -> f64 {
    if targets.is_empty() {
        return if evidence.is_empty() { 0.0 } else { 1.0 };
    }
    let credit: f64 = targets
        .iter()
        .map(|kind| {
            let mut best: f64 = 0.0;
            for record in evidence.iter().filter(|r| r.entity_kinds.contains(kind)) {
                match record.channel {
                    Channel::Graph => return 1.0,
                    Channel::Semantic => best = 0.5,
                }
            }
            best
        })
        .sum();
    credit / targets.len() as f64
}

fn depth(evidence: &EvidenceSet) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }
    let n = evidence.len() as f64;
    let relational = evidence.iter().filter(|r| r.has_relationship_context()).count() as f64;
    let sourced = evidence.iter().filter(|r| r.has_source_context()).count() as f64;
    0.5 * (relational / n) + 0.5 * (sourced / n)
}

fn accuracy(evidence: &EvidenceSet, signals: &IterationSignals<'_>) -> f64 {
    let confidence = signals.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    match signals.graph {
        GraphOutcome::Executed { rows } if *rows > 0 => confidence,
        GraphOutcome::Executed { .. } => confidence / 2.0,
        GraphOutcome::Failed { .. }
        | GraphOutcome::Skipped {
            reason: SkipReason::TranslationFailed,
        } => 0.0,
        GraphOutcome::Skipped { .. } => {
            let scores: Vec<f64> = evidence
                .from_channel(Channel::Semantic)
                .map(|r| r.relevance)
                .collect();
            if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            }
        }
    }
}

fn completeness(evidence: &EvidenceSet, intent: Option<&StructuredIntent>) -> f64 {
    if !intent.is_some_and(|i| i.ambiguous) {
        return 1.0;
    }
    let mut sources: BTreeSet<String> = evidence
        .iter()
        .map(|r| match &r.location {
            Some(location) => location.path.trim_start_matches("./").to_string(),
            None => r.locator.to_string(),
        })
        .collect();
    sources.extend(evidence.kinds().into_iter().map(|k| format!("kind:{k}")));
    0.5 + 0.5 * (sources.len() as f64 / COMPLETENESS_SATURATION).min(1.0)
}
