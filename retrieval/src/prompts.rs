use crate::call::PromptMode;
use crate::evidence::{EvidencePayload, EvidenceRecord};
use crate::executor::GraphOutcome;
use crate::history::IterationHistory;
use crate::intent::StructuredIntent;
use crate::query::Query;
use crate::sufficiency::{RefinementDirective, SufficiencyVerdict};
use codexgraph_graph_store::GraphSchemaDescriptor;
use std::fmt::Write;

const SNIPPET_PREVIEW_CHARS: usize = 400;

pub const INTENT_SYSTEM_PROMPT: &str = "\
You analyse questions about a source code repository that is indexed as a code property graph.
Reply with a single JSON object:
{\"targets\": [...], \"relationships\": [...], \"scope\": {\"path_prefix\": null, \"language\": null}, \"ambiguous\": false, \"focus\": null}

- targets: entity kinds the question asks about, chosen from module, class, function, method, field, global_variable. Use [] when the question names none.
- relationships: relationship types of interest, chosen from CONTAINS, HAS_METHOD, HAS_FIELD, INHERITS, USES.
- scope: a path prefix or language the question restricts itself to, otherwise null.
- ambiguous: true when the question could reasonably mean several different things.
- focus: the identifier or concept the question is about, if any.";

pub const TRANSLATION_SYSTEM_PROMPT: &str = "\
You write read-only Cypher queries against a code property graph.
Reply with a single JSON object:
{\"query\": \"MATCH ... RETURN ...\", \"confidence\": 0.0, \"assumptions\": []}

Rules:
- Only MATCH, OPTIONAL MATCH, WITH, WHERE, RETURN, ORDER BY, SKIP, LIMIT and UNION. Never write to the graph.
- Use only the node labels, relationship types and properties listed in the schema.
- Return the `code` property of matched entities so results can be located in source.
- Every UNION branch must return the same column names in the same order.
- Use `n.prop IS NOT NULL` instead of exists(n.prop).
- confidence is your estimate (0.0 to 1.0) that the query answers the question.";

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You answer questions about a codebase using only the evidence provided.
Cite evidence by its [number]. Say plainly when the evidence does not cover part of the question.";

fn strict_suffix(out: &mut String, mode: PromptMode, feedback: Option<&str>, shape: &str) {
    if mode == PromptMode::Strict {
        let _ = writeln!(out, "\nSTRICT MODE: your previous reply was rejected.");
        if let Some(feedback) = feedback {
            let _ = writeln!(out, "Problem: {feedback}");
        }
        let _ = writeln!(
            out,
            "Respond with ONLY {shape}. No prose, no code fences."
        );
    }
}

fn directive_hint(directive: RefinementDirective) -> &'static str {
    match directive {
        RefinementDirective::Expand => {
            "Broaden the search: include related entity kinds and relax scope restrictions."
        }
        RefinementDirective::Narrow => {
            "Narrow the search: tighten the scope and concentrate on the most specific identifiers."
        }
        RefinementDirective::Pivot => {
            "Structural queries keep failing: prefer simpler patterns and concepts text search can match."
        }
    }
}

fn write_history(out: &mut String, history: &IterationHistory) {
    if history.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nPREVIOUS ROUNDS:");
    for record in history {
        let targets = record
            .intent
            .as_ref()
            .map(|i| {
                let names: Vec<String> = i.targets.iter().map(ToString::to_string).collect();
                format!("[{}]", names.join(", "))
            })
            .unwrap_or_else(|| "(intent failed)".to_string());
        let _ = writeln!(
            out,
            "- round {}: targets {targets}; graph {}; semantic {}; score {:.2}",
            record.index,
            record.graph.describe(),
            record.semantic.describe(),
            record.verdict.overall,
        );
        if let Some(formal) = &record.formal_query {
            let _ = writeln!(out, "  query: {}", formal.text);
        }
    }
    if let Some(last) = history.last()
        && let Some(directive) = last.verdict.directive
    {
        let _ = writeln!(
            out,
            "\nREFINEMENT ({directive}): {}\nReason: {}",
            directive_hint(directive),
            last.verdict.rationale
        );
    }
}

pub fn intent_prompt(
    query: &Query,
    history: &IterationHistory,
    mode: PromptMode,
    feedback: Option<&str>,
) -> String {
    let mut out = format!("QUESTION: {}\n", query.text());
    write_history(&mut out, history);
    strict_suffix(&mut out, mode, feedback, "the JSON object");
    out
}

pub fn translation_prompt(
    query: &Query,
    intent: &StructuredIntent,
    schema: &GraphSchemaDescriptor,
    history: &IterationHistory,
    mode: PromptMode,
    feedback: Option<&str>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SCHEMA:\n{}", schema.describe());
    let intent_json = serde_json::to_string(intent).unwrap_or_default();
    let _ = writeln!(out, "INTENT: {intent_json}");
    let _ = writeln!(out, "QUESTION: {}", query.text());

    write_history(&mut out, history);
    if let Some(last) = history.last() {
        let hint = match &last.graph {
            GraphOutcome::Executed { rows: 0 } => Some(
                "The previous query returned no rows. Broaden it: relax name filters, prefer CONTAINS or case-insensitive matching.",
            ),
            GraphOutcome::Failed { .. } => {
                Some("The previous query failed. Write a different query that avoids the error.")
            }
            _ => None,
        };
        if let Some(hint) = hint {
            let _ = writeln!(out, "{hint}");
        }
    }

    strict_suffix(
        &mut out,
        mode,
        feedback,
        "the JSON object with a single valid read-only query",
    );
    out
}

pub fn synthesis_prompt(
    query: &Query,
    evidence: &[EvidenceRecord],
    verdict: &SufficiencyVerdict,
    partial: bool,
    mode: PromptMode,
    feedback: Option<&str>,
) -> String {
    let mut out = format!("QUESTION: {}\n\nEVIDENCE:\n", query.text());
    for (idx, record) in evidence.iter().enumerate() {
        let _ = writeln!(out, "[{}] {} ({})", idx + 1, record.title(), record.locator);
        match &record.payload {
            EvidencePayload::GraphRow { columns, .. } => {
                let row = serde_json::to_string(columns).unwrap_or_default();
                let _ = writeln!(out, "    {}", preview(&row));
            }
            EvidencePayload::Snippet { content, .. } => {
                for line in preview(content).lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
    }
    if partial {
        let _ = writeln!(
            out,
            "\nThe evidence is incomplete ({}). Answer with what is supported.",
            verdict.rationale
        );
    }
    strict_suffix(&mut out, mode, feedback, "the answer text");
    out
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(SNIPPET_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
