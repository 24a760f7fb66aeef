/*!
# CodexGraph Retrieval

Iterative multi-strategy retrieval over a code property graph and a vector
index. A session interprets the question, translates it into read-only
Cypher, runs the graph and semantic channels side by side, merges their
evidence, scores it and refines until the evidence is sufficient or the
iteration budget is spent.

```text
Query ─▶ IntentExtractor ─▶ QueryTranslator ─▶ GraphExecutor ─┐
              ▲                                               ├▶ ResultAggregator ─▶ SufficiencyEvaluator
              │                              SemanticRetriever ┘                            │
              └────────────────────── refinement directive ◀────────────────────────────────┘
                                                                                            ▼
                                                                               AnswerSynthesizer ─▶ FinalAnswer
```

Collaborators (language model, graph store, vector index) are trait
objects, so tests drive the whole loop with scripted fakes.
*/

mod aggregator;
mod answer;
mod call;
mod config;
pub mod cypher;
mod error;
mod evidence;
mod executor;
mod history;
mod intent;
mod pipeline;
mod prompts;
mod query;
mod semantic;
mod sufficiency;
mod synthesizer;
mod translator;

pub use aggregator::ResultAggregator;
pub use answer::{Citation, FinalAnswer, Termination};
pub use call::PromptMode;
pub use config::{ChannelMode, PipelineConfig, SufficiencyWeights};
pub use error::{
    AbortReason, CollaboratorTimeout, GraphExecutionError, IntentExtractionError,
    PipelineAbortedError, Result, SemanticRetrievalError, TranslationError,
};
pub use evidence::{Channel, EvidencePayload, EvidenceRecord, EvidenceSet, Locator};
pub use executor::{GraphExecutor, GraphOutcome, SkipReason};
pub use history::{IterationHistory, IterationRecord};
pub use intent::{
    EntityKind, IntentExtractor, Scope, StructuredIntent, infer_relationships, infer_targets,
    normalize_relationship,
};
pub use pipeline::{Collaborators, PipelineState, RetrievalPipeline};
pub use query::Query;
pub use semantic::{SemanticOutcome, SemanticRetriever, VectorIndex};
pub use sufficiency::{
    AxisScores, IterationSignals, RefinementDirective, SufficiencyEvaluator, SufficiencyVerdict,
};
pub use synthesizer::{AnswerSynthesizer, Synthesis};
pub use translator::{FormalQuery, QueryTranslator};

use tokio_util::sync::CancellationToken;

/// Run one retrieval session with a fresh pipeline.
pub async fn run_query(
    text: &str,
    config: PipelineConfig,
    collaborators: Collaborators,
    cancel: CancellationToken,
) -> Result<FinalAnswer> {
    let pipeline = RetrievalPipeline::new(config, collaborators)?;
    pipeline.run(Query::new(text), &cancel).await
}
