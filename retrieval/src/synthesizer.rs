use crate::answer::Citation;
use crate::call::{PromptMode, call_structured};
use crate::evidence::{EvidenceRecord, EvidenceSet};
use crate::intent::EntityKind;
use crate::prompts;
use crate::query::Query;
use crate::sufficiency::SufficiencyVerdict;
use codexgraph_llm::{CallSite, CompletionOptions, LanguageModel};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Answer prose plus the records it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// Writes the final answer. Falls back to a plain evidence listing when the
/// model cannot produce one, so synthesis itself never fails.
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_citations: usize,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration, max_citations: usize) -> Self {
        Self {
            model,
            timeout,
            max_citations,
        }
    }

    pub async fn synthesize(
        &self,
        query: &Query,
        evidence: &EvidenceSet,
        verdict: &SufficiencyVerdict,
        partial: bool,
        missing_kinds: &[EntityKind],
    ) -> Synthesis {
        let cited: Vec<&EvidenceRecord> = evidence.iter().take(self.max_citations).collect();
        let citations: Vec<Citation> = cited
            .iter()
            .enumerate()
            .map(|(idx, record)| Citation::from_record(idx + 1, record))
            .collect();

        let body = if cited.is_empty() {
            format!("No evidence was found for \"{}\".", query.text())
        } else {
            let records: Vec<EvidenceRecord> = cited.iter().map(|r| (*r).clone()).collect();
            match self.prose(query, &records, verdict, partial).await {
                Some(prose) => prose,
                None => fallback_listing(query, &citations, evidence.len()),
            }
        };

        Synthesis {
            answer: with_notices(body, verdict, partial, missing_kinds),
            citations,
        }
    }

    async fn prose(
        &self,
        query: &Query,
        records: &[EvidenceRecord],
        verdict: &SufficiencyVerdict,
        partial: bool,
    ) -> Option<String> {
        let options =
            CompletionOptions::new(CallSite::Synthesis).with_system(prompts::SYNTHESIS_SYSTEM_PROMPT);
        let build = |mode: PromptMode, feedback: Option<&str>| {
            prompts::synthesis_prompt(query, records, verdict, partial, mode, feedback)
        };
        let parse = |text: &str| {
            let text = text.trim();
            if text.is_empty() {
                Err("empty answer".to_string())
            } else {
                Ok(text.to_string())
            }
        };

        match call_structured(self.model.as_ref(), &options, self.timeout, build, parse).await {
            Ok((prose, _)) => Some(prose),
            Err(failure) => {
                warn!(?failure, "synthesis failed, listing evidence instead");
                None
            }
        }
    }
}

fn fallback_listing(query: &Query, citations: &[Citation], total: usize) -> String {
    let mut out = format!(
        "Found {total} piece(s) of evidence for \"{}\":\n",
        query.text()
    );
    for citation in citations {
        let _ = writeln!(
            out,
            "- [{}] {} ({}, {})",
            citation.index, citation.title, citation.locator, citation.channel
        );
    }
    if total > citations.len() {
        let _ = writeln!(out, "- ... and {} more", total - citations.len());
    }
    out.trim_end().to_string()
}

fn with_notices(
    body: String,
    verdict: &SufficiencyVerdict,
    partial: bool,
    missing_kinds: &[EntityKind],
) -> String {
    let mut out = body;
    if partial {
        let _ = write!(
            out,
            "\n\nNote: this answer is partial. The evidence did not reach the sufficiency threshold ({}).",
            verdict.rationale
        );
    }
    if !missing_kinds.is_empty() {
        let names: Vec<String> = missing_kinds.iter().map(ToString::to_string).collect();
        let _ = write!(out, "\n\nNo evidence was found for: {}.", names.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ResultAggregator;
    use crate::evidence::{Channel, EvidencePayload, Locator};
    use crate::sufficiency::AxisScores;
    use codexgraph_llm::{ScriptedModel, ScriptedReply};
    use pretty_assertions::assert_eq;

    fn verdict(passed: bool) -> SufficiencyVerdict {
        SufficiencyVerdict {
            scores: AxisScores {
                coverage: 0.5,
                depth: 0.5,
                accuracy: 0.0,
                completeness: 1.0,
            },
            overall: 0.5,
            passed,
            directive: None,
            rationale: "overall 0.50 below threshold 0.80".into(),
            missing_kinds: vec![],
        }
    }

    fn evidence(n: usize) -> EvidenceSet {
        let records = (0..n)
            .map(|i| EvidenceRecord {
                channel: Channel::Semantic,
                locator: Locator::file_range(&format!("src/f{i}.py"), 1, 4),
                payload: EvidencePayload::Snippet {
                    path: format!("src/f{i}.py"),
                    language: Some("python".into()),
                    content: "def f(): pass".into(),
                },
                relevance: 0.9 - i as f64 * 0.1,
                supplementary_score: None,
                entity_kinds: vec![],
                relationships: vec![],
                location: None,
                iteration: 1,
            })
            .collect();
        let mut set = EvidenceSet::default();
        ResultAggregator.merge(&mut set, records);
        set
    }

    fn synthesizer(model: ScriptedModel, max_citations: usize) -> AnswerSynthesizer {
        AnswerSynthesizer::new(Arc::new(model), Duration::from_secs(5), max_citations)
    }

    #[tokio::test]
    async fn test_prose_with_citations() {
        let model = ScriptedModel::new()
            .with_reply(CallSite::Synthesis, ScriptedReply::text("Login lives in f0 [1]."));

        let synthesis = synthesizer(model, 20)
            .synthesize(&Query::new("where is login"), &evidence(3), &verdict(true), false, &[])
            .await;

        assert_eq!(synthesis.answer, "Login lives in f0 [1].");
        assert_eq!(synthesis.citations.len(), 3);
        assert_eq!(synthesis.citations[0].index, 1);
        assert_eq!(synthesis.citations[0].title, "src/f0.py");
    }

    #[tokio::test]
    async fn test_partial_notice_and_missing_kinds() {
        let model = ScriptedModel::new()
            .with_reply(CallSite::Synthesis, ScriptedReply::text("Some of it [1]."));

        let synthesis = synthesizer(model, 20)
            .synthesize(
                &Query::new("classes and methods"),
                &evidence(1),
                &verdict(false),
                true,
                &[EntityKind::Method],
            )
            .await;

        assert!(synthesis.answer.starts_with("Some of it [1]."));
        assert!(synthesis.answer.contains("this answer is partial"));
        assert!(synthesis.answer.ends_with("No evidence was found for: method."));
    }

    #[tokio::test]
    async fn test_fallback_listing_when_model_fails() {
        let model = ScriptedModel::new()
            .with_default(CallSite::Synthesis, ScriptedReply::Error("down".into()));

        let synthesis = synthesizer(model, 2)
            .synthesize(&Query::new("login"), &evidence(3), &verdict(true), false, &[])
            .await;

        assert_eq!(
            synthesis.answer,
            "Found 3 piece(s) of evidence for \"login\":\n\
             - [1] src/f0.py (src/f0.py:1-4, semantic)\n\
             - [2] src/f1.py (src/f1.py:1-4, semantic)\n\
             - ... and 1 more"
        );
        assert_eq!(synthesis.citations.len(), 2);
    }

    #[tokio::test]
    async fn test_no_evidence_skips_model() {
        let model = Arc::new(ScriptedModel::new());
        let synthesizer = AnswerSynthesizer::new(model.clone(), Duration::from_secs(5), 20);

        let synthesis = synthesizer
            .synthesize(&Query::new("login"), &EvidenceSet::default(), &verdict(false), true, &[])
            .await;

        assert!(synthesis.answer.starts_with("No evidence was found for \"login\"."));
        assert!(synthesis.citations.is_empty());
        assert!(model.calls().is_empty());
    }
}
