//! The refinement loop.
//!
//! ```text
//! INIT -> UNDERSTANDING -> TRANSLATION -> EXECUTION -> EVALUATION
//!             ^                                           |
//!             +---------------- REFINEMENT <--------------+
//!                                                         |
//!                                                  COMPLETION
//! ```
//!
//! Intent or translation failures jump straight to EVALUATION. Any state may
//! move to ABORTED on cancellation; only an iteration in which every enabled
//! channel was unavailable aborts on its own.

use crate::aggregator::ResultAggregator;
use crate::answer::{FinalAnswer, Termination};
use crate::config::PipelineConfig;
use crate::error::{AbortReason, PipelineAbortedError, Result};
use crate::evidence::{Channel, EvidenceSet};
use crate::executor::{GraphExecutor, GraphOutcome, SkipReason};
use crate::history::{IterationHistory, IterationRecord};
use crate::intent::{EntityKind, IntentExtractor};
use crate::query::Query;
use crate::semantic::{SemanticOutcome, SemanticRetriever, VectorIndex};
use crate::sufficiency::{IterationSignals, RefinementDirective, SufficiencyEvaluator};
use crate::synthesizer::AnswerSynthesizer;
use crate::translator::QueryTranslator;
use codexgraph_graph_store::GraphStore;
use codexgraph_llm::LanguageModel;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Pivots widen the semantic channel up to this multiple of `semantic_top_k`.
const MAX_TOP_K_GROWTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    Understanding,
    Translation,
    Execution,
    Evaluation,
    Refinement,
    Completion,
    Aborted,
}

/// Shared handles to the external capabilities a session uses.
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn LanguageModel>,
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorIndex>,
}

#[derive(Default)]
struct Session {
    trace: Vec<PipelineState>,
    evidence: EvidenceSet,
    history: IterationHistory,
}

impl Session {
    fn enter(&mut self, state: PipelineState, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(self.abort(AbortReason::Cancelled, None));
        }
        debug!(?state, "pipeline state");
        self.trace.push(state);
        Ok(())
    }

    fn abort(&mut self, reason: AbortReason, current: Option<IterationRecord>) -> PipelineAbortedError {
        warn!(%reason, "retrieval aborted");
        self.trace.push(PipelineState::Aborted);
        let last_iteration = current.or_else(|| self.history.last().cloned());
        PipelineAbortedError {
            reason,
            last_iteration: last_iteration.map(Box::new),
            evidence: std::mem::take(&mut self.evidence),
        }
    }
}

/// One configured controller; `run` may be called for many queries.
pub struct RetrievalPipeline {
    config: PipelineConfig,
    graph: Arc<dyn GraphStore>,
    extractor: IntentExtractor,
    translator: QueryTranslator,
    graph_executor: GraphExecutor,
    semantic: SemanticRetriever,
    aggregator: ResultAggregator,
    evaluator: SufficiencyEvaluator,
    synthesizer: AnswerSynthesizer,
}

impl RetrievalPipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config
            .validate()
            .map_err(|msg| PipelineAbortedError::new(AbortReason::InvalidConfig(msg)))?;

        let timeout = config.agent_timeout();
        let Collaborators {
            model,
            graph,
            vectors,
        } = collaborators;

        Ok(Self {
            extractor: IntentExtractor::new(model.clone(), timeout),
            translator: QueryTranslator::new(model.clone(), timeout),
            graph_executor: GraphExecutor::new(graph.clone(), timeout),
            semantic: SemanticRetriever::new(vectors, timeout, config.semantic_min_score),
            aggregator: ResultAggregator,
            evaluator: SufficiencyEvaluator::new(&config),
            synthesizer: AnswerSynthesizer::new(model, timeout, config.max_citations),
            graph,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer `query`, refining until the evidence is sufficient or the
    /// iteration budget runs out.
    pub async fn run(&self, query: Query, cancel: &CancellationToken) -> Result<FinalAnswer> {
        let span = info_span!("retrieval", query = %query.text());
        self.run_session(query, cancel).instrument(span).await
    }

    async fn run_session(&self, query: Query, cancel: &CancellationToken) -> Result<FinalAnswer> {
        let started = Instant::now();
        let mut session = Session::default();
        session.enter(PipelineState::Init, cancel)?;

        if query.is_empty() {
            return Err(session.abort(
                AbortReason::InvalidQuery("query text is empty".to_string()),
                None,
            ));
        }

        let max_iterations = self.config.max_iterations;
        let max_top_k = self.config.semantic_top_k.saturating_mul(MAX_TOP_K_GROWTH);
        let mut top_k = self.config.semantic_top_k;
        let mut directive: Option<RefinementDirective> = None;
        let mut termination = Termination::BudgetExhausted;

        for index in 1..=max_iterations {
            if directive == Some(RefinementDirective::Pivot) {
                top_k = top_k.saturating_mul(2).min(max_top_k);
            }

            let round = self
                .iterate(&query, index, &mut session, directive, top_k, cancel)
                .instrument(info_span!("iteration", index));
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                record = round => Some(record),
            };
            let record = match outcome {
                Some(record) => record?,
                None => return Err(session.abort(AbortReason::Cancelled, None)),
            };

            let passed = record.verdict.passed;
            directive = record.verdict.directive;
            session.history.push(record);

            if passed {
                termination = Termination::Sufficient;
                break;
            }
            if index < max_iterations {
                session.enter(PipelineState::Refinement, cancel)?;
            }
        }

        session.enter(PipelineState::Completion, cancel)?;
        let Some(verdict) = session.history.last().map(|r| r.verdict.clone()) else {
            return Err(session.abort(
                AbortReason::InvalidConfig("no iteration ran".to_string()),
                None,
            ));
        };

        let partial = termination == Termination::BudgetExhausted;
        let present = session.evidence.kinds();
        let missing_kinds: Vec<EntityKind> = session
            .history
            .original_intent()
            .map(|intent| {
                intent
                    .targets
                    .iter()
                    .copied()
                    .filter(|k| !present.contains(k))
                    .collect()
            })
            .unwrap_or_default();

        let synthesis = self
            .synthesizer
            .synthesize(&query, &session.evidence, &verdict, partial, &missing_kinds)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            iterations = session.history.len(),
            evidence = session.evidence.len(),
            partial,
            elapsed_ms,
            "retrieval complete"
        );

        Ok(FinalAnswer {
            query: query.text().to_string(),
            answer: synthesis.answer,
            citations: synthesis.citations,
            partial,
            termination,
            iterations: session.history.len(),
            elapsed_ms,
            missing_kinds,
            verdict,
            evidence: session.evidence,
            history: session.history,
            state_trace: session.trace,
        })
    }

    async fn iterate(
        &self,
        query: &Query,
        index: usize,
        session: &mut Session,
        directive: Option<RefinementDirective>,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<IterationRecord> {
        let graph_enabled = self.config.channels.graph_enabled();
        let semantic_enabled = self.config.channels.semantic_enabled();

        let mut discarded = Vec::new();
        if directive == Some(RefinementDirective::Pivot)
            && self.config.pivot_discards_structural_evidence
        {
            discarded = self
                .aggregator
                .discard_channel(&mut session.evidence, Channel::Graph);
            if !discarded.is_empty() {
                info!(count = discarded.len(), "pivot discarded structural evidence");
            }
        }

        session.enter(PipelineState::Understanding, cancel)?;
        let mut failures = Vec::new();
        let intent = match self.extractor.extract(query, &session.history).await {
            Ok(intent) => Some(intent),
            Err(err) => {
                warn!(error = %err, "intent extraction failed");
                failures.push(err.to_string());
                None
            }
        };

        let mut formal_query = None;
        let mut graph = GraphOutcome::Skipped {
            reason: if graph_enabled {
                SkipReason::IntentFailed
            } else {
                SkipReason::ChannelDisabled
            },
        };
        let mut semantic = SemanticOutcome::Skipped;
        let mut added = Vec::new();

        if let Some(intent) = &intent {
            let mut translated = true;
            if graph_enabled {
                session.enter(PipelineState::Translation, cancel)?;
                match self
                    .translator
                    .translate(query, intent, self.graph.schema(), &session.history)
                    .await
                {
                    Ok(formal) => formal_query = Some(formal),
                    Err(err) => {
                        warn!(error = %err, "translation failed");
                        failures.push(err.to_string());
                        graph = GraphOutcome::Skipped {
                            reason: SkipReason::TranslationFailed,
                        };
                        translated = false;
                    }
                }
            }

            if translated {
                session.enter(PipelineState::Execution, cancel)?;

                let graph_round = async {
                    match &formal_query {
                        Some(formal) => Some(self.graph_executor.execute(formal, index).await),
                        None => None,
                    }
                };
                let semantic_round = async {
                    if semantic_enabled {
                        Some(self.semantic.retrieve(query, intent, top_k, index).await)
                    } else {
                        None
                    }
                };
                let (graph_result, semantic_result) = tokio::join!(graph_round, semantic_round);

                let mut incoming = Vec::new();
                match graph_result {
                    Some(Ok(records)) => {
                        graph = GraphOutcome::Executed {
                            rows: records.len(),
                        };
                        incoming.extend(records);
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "graph execution failed");
                        graph = GraphOutcome::Failed {
                            error: err.to_string(),
                            unavailable: err.is_unavailability(),
                        };
                    }
                    None => {}
                }
                match semantic_result {
                    Some(Ok((records, below_min_score))) => {
                        semantic = SemanticOutcome::Retrieved {
                            records: records.len(),
                            below_min_score,
                        };
                        incoming.extend(records);
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "semantic retrieval failed");
                        semantic = SemanticOutcome::Failed {
                            error: err.to_string(),
                        };
                    }
                    None => {}
                }

                added = self.aggregator.merge(&mut session.evidence, incoming);
            }
        }

        session.enter(PipelineState::Evaluation, cancel)?;
        let (prior_failures, prior_successes) = session.history.graph_tally();
        let verdict = {
            let signals = IterationSignals {
                intent: intent.as_ref().or_else(|| session.history.last_intent()),
                confidence: formal_query.as_ref().map(|f| f.confidence),
                graph: &graph,
                graph_enabled,
                graph_failures: prior_failures + usize::from(graph.is_failure()),
                graph_successes: prior_successes
                    + usize::from(matches!(graph, GraphOutcome::Executed { .. })),
            };
            self.evaluator.evaluate(&session.evidence, &signals)
        };
        info!(
            overall = verdict.overall,
            coverage = verdict.scores.coverage,
            passed = verdict.passed,
            directive = ?verdict.directive,
            evidence = session.evidence.len(),
            "evaluated evidence"
        );

        let channels_down = self.all_channels_unavailable(&graph, &semantic);
        let record = IterationRecord {
            index,
            intent,
            formal_query,
            graph,
            semantic,
            added,
            discarded,
            verdict,
            failures,
        };

        if channels_down {
            return Err(session.abort(AbortReason::CollaboratorsUnavailable, Some(record)));
        }
        Ok(record)
    }

    /// Every enabled channel ran and failed for availability reasons.
    fn all_channels_unavailable(&self, graph: &GraphOutcome, semantic: &SemanticOutcome) -> bool {
        let graph_enabled = self.config.channels.graph_enabled();
        let semantic_enabled = self.config.channels.semantic_enabled();
        let graph_down = graph.is_unavailable();
        let semantic_down = semantic.is_failure();

        match (graph_enabled, semantic_enabled) {
            (true, true) => graph_down && semantic_down,
            (true, false) => graph_down,
            (false, true) => semantic_down,
            (false, false) => false,
        }
    }
}
