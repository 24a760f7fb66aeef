use crate::call::{CallFailure, PromptMode, call_structured};
use crate::cypher::{clean_query, validate_query};
use crate::error::TranslationError;
use crate::history::IterationHistory;
use crate::intent::StructuredIntent;
use crate::prompts;
use crate::query::Query;
use codexgraph_graph_store::GraphSchemaDescriptor;
use codexgraph_llm::{CallSite, CompletionOptions, LanguageModel, parse_json_object};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIDENCE: f64 = 0.5;
const AMBIGUITY_PENALTY: f64 = 0.75;
const REGENERATION_PENALTY: f64 = 0.9;

/// A validated, read-only graph query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalQuery {
    pub text: String,
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    /// 0.0 - 1.0
    pub confidence: f64,
    #[serde(default)]
    pub assumptions: Vec<String>,
    /// Produced by the strict retry after a rejected first attempt
    #[serde(default)]
    pub regenerated: bool,
}

#[derive(Debug, Deserialize)]
struct TranslationReply {
    #[serde(alias = "cypher")]
    query: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    assumptions: Assumptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Assumptions {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Assumptions {
    fn into_vec(self) -> Vec<String> {
        match self {
            Assumptions::None => Vec::new(),
            Assumptions::One(s) if s.trim().is_empty() => Vec::new(),
            Assumptions::One(s) => vec![s],
            Assumptions::Many(v) => v,
        }
    }
}

struct Candidate {
    text: String,
    labels: Vec<String>,
    relationship_types: Vec<String>,
    confidence: Option<f64>,
    assumptions: Vec<String>,
}

/// Intent to Cypher, validated against the graph schema before use.
pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn translate(
        &self,
        query: &Query,
        intent: &StructuredIntent,
        schema: &GraphSchemaDescriptor,
        history: &IterationHistory,
    ) -> Result<FormalQuery, TranslationError> {
        let options =
            CompletionOptions::json(CallSite::Translation).with_system(prompts::TRANSLATION_SYSTEM_PROMPT);

        let build = |mode: PromptMode, feedback: Option<&str>| {
            prompts::translation_prompt(query, intent, schema, history, mode, feedback)
        };
        let parse = |text: &str| parse_candidate(text, schema);

        let (candidate, attempts) =
            call_structured(self.model.as_ref(), &options, self.timeout, build, parse)
                .await
                .map_err(|failure| match failure {
                    CallFailure::Timeout(t) => TranslationError::Timeout(t),
                    CallFailure::Collaborator(e) => TranslationError::Collaborator(e),
                    CallFailure::Malformed(reason) => TranslationError::Invalid(reason),
                })?;

        let regenerated = attempts > 1;
        let confidence = adjusted_confidence(candidate.confidence, intent.ambiguous, regenerated);
        debug!(query = %candidate.text, confidence, regenerated, "translated intent");

        Ok(FormalQuery {
            text: candidate.text,
            labels: candidate.labels,
            relationship_types: candidate.relationship_types,
            confidence,
            assumptions: candidate.assumptions,
            regenerated,
        })
    }
}

fn parse_candidate(text: &str, schema: &GraphSchemaDescriptor) -> Result<Candidate, String> {
    let reply: TranslationReply = parse_json_object(text).map_err(|e| e.to_string())?;
    let cleaned = clean_query(&reply.query);
    let refs = validate_query(&cleaned, schema)?;
    Ok(Candidate {
        text: cleaned,
        labels: refs.labels.into_iter().collect(),
        relationship_types: refs.relationship_types.into_iter().collect(),
        confidence: reply.confidence,
        assumptions: reply.assumptions.into_vec(),
    })
}

/// Self-reported confidence, discounted for ambiguous intents and for
/// queries that needed regeneration.
fn adjusted_confidence(reported: Option<f64>, ambiguous: bool, regenerated: bool) -> f64 {
    let mut confidence = reported
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);
    if ambiguous {
        confidence *= AMBIGUITY_PENALTY;
    }
    if regenerated {
        confidence *= REGENERATION_PENALTY;
    }
    confidence
}
