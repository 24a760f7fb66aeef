//! Report rendering for a finished session.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat};
use clap::ValueEnum;
use codexgraph_retrieval::{
    Citation, FinalAnswer, IterationRecord, PipelineAbortedError, StructuredIntent, Termination,
};
use serde_json::{Value, json};
use std::fmt::Write;
use std::path::Path;
use tracing::warn;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Markdown with a front-matter header
    #[default]
    #[value(name = "md")]
    Markdown,
    /// The whole answer, including history and evidence
    Json,
    /// Answer plus per-iteration details
    Text,
}

pub fn render(
    answer: &FinalAnswer,
    format: ReportFormat,
    generated_at: DateTime<Local>,
    code_root: Option<&Path>,
) -> Result<String> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(answer, generated_at)),
        ReportFormat::Json => render_json(answer, code_root),
        ReportFormat::Text => Ok(render_text(answer)),
    }
}

fn termination_label(termination: Termination) -> &'static str {
    match termination {
        Termination::Sufficient => "sufficient",
        Termination::BudgetExhausted => "budget_exhausted",
    }
}

fn citation_line(citation: &Citation) -> String {
    format!(
        "{} ({}, {}, relevance {:.2})",
        citation.title, citation.locator, citation.channel, citation.relevance
    )
}

fn render_markdown(answer: &FinalAnswer, generated_at: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "query: {:?}", answer.query);
    let _ = writeln!(
        out,
        "generated: {}",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, false)
    );
    let _ = writeln!(out, "elapsed_ms: {}", answer.elapsed_ms);
    let _ = writeln!(out, "iterations: {}", answer.iterations);
    let _ = writeln!(out, "termination: {}", termination_label(answer.termination));
    let _ = writeln!(out, "partial: {}", answer.partial);
    let _ = writeln!(out, "overall_score: {:.2}", answer.verdict.overall);
    let _ = writeln!(out, "---\n");

    let _ = writeln!(out, "# Answer\n\n{}\n", answer.answer);

    if !answer.citations.is_empty() {
        let _ = writeln!(out, "## Citations\n");
        for citation in &answer.citations {
            let _ = writeln!(
                out,
                "{}. **{}** `{}` ({}, relevance {:.2})",
                citation.index,
                citation.title,
                citation.locator,
                citation.channel,
                citation.relevance
            );
        }
        out.push('\n');
    }

    if !answer.missing_kinds.is_empty() {
        let _ = writeln!(out, "## Not found\n");
        for kind in &answer.missing_kinds {
            let _ = writeln!(out, "- {kind}");
        }
    }

    out.trim_end().to_string() + "\n"
}

/// Whole answer as JSON. With `code_root`, cited source ranges are read from
/// disk and attached as `extracted_code`.
fn render_json(answer: &FinalAnswer, code_root: Option<&Path>) -> Result<String> {
    let mut value = serde_json::to_value(answer).context("failed to serialize answer")?;
    if let Some(root) = code_root
        && let Value::Object(map) = &mut value
    {
        map.insert("extracted_code".into(), extracted_code(answer, root));
    }
    serde_json::to_string_pretty(&value).context("failed to render JSON report")
}

fn extracted_code(answer: &FinalAnswer, root: &Path) -> Value {
    let snippets: Vec<Value> = answer
        .citations
        .iter()
        .filter_map(|citation| {
            let location = citation.location.as_ref()?;
            let path = root.join(location.path.trim_start_matches("./"));
            match std::fs::read_to_string(&path) {
                Ok(contents) => Some(json!({
                    "citation": citation.index,
                    "path": location.path,
                    "start_line": location.start_line,
                    "end_line": location.end_line,
                    "code": location.extract_lines(&contents),
                })),
                Err(err) => {
                    warn!(path = %path.display(), %err, "cited file unreadable");
                    None
                }
            }
        })
        .collect();
    Value::Array(snippets)
}

fn describe_intent(intent: &StructuredIntent) -> String {
    let targets: Vec<String> = intent.targets.iter().map(ToString::to_string).collect();
    let mut out = format!("targets [{}]", targets.join(", "));
    if !intent.relationships.is_empty() {
        let _ = write!(out, ", relationships [{}]", intent.relationships.join(", "));
    }
    if let Some(prefix) = &intent.scope.path_prefix {
        let _ = write!(out, ", under {prefix}");
    }
    if let Some(language) = &intent.scope.language {
        let _ = write!(out, ", language {language}");
    }
    if intent.ambiguous {
        out.push_str(" (ambiguous)");
    }
    out
}

fn render_iteration(out: &mut String, record: &IterationRecord) {
    let _ = writeln!(out, "Iteration {}:", record.index);
    match &record.intent {
        Some(intent) => {
            let _ = writeln!(out, "  intent: {}", describe_intent(intent));
        }
        None => {
            let _ = writeln!(out, "  intent: unavailable");
        }
    }
    if let Some(query) = &record.formal_query {
        let _ = writeln!(
            out,
            "  formal query: {} (confidence {:.2})",
            query.text, query.confidence
        );
    }
    let _ = writeln!(out, "  graph: {}", record.graph.describe());
    let _ = writeln!(out, "  semantic: {}", record.semantic.describe());
    for failure in &record.failures {
        let _ = writeln!(out, "  failure: {failure}");
    }
    let _ = writeln!(
        out,
        "  evidence: +{} added, {} discarded",
        record.added.len(),
        record.discarded.len()
    );
    let verdict = &record.verdict;
    let _ = write!(
        out,
        "  verdict: {:.2} (coverage {:.2}, depth {:.2}, accuracy {:.2}, completeness {:.2})",
        verdict.overall,
        verdict.scores.coverage,
        verdict.scores.depth,
        verdict.scores.accuracy,
        verdict.scores.completeness
    );
    match verdict.directive {
        Some(directive) => {
            let _ = writeln!(out, " -> {directive}");
        }
        None => {
            let _ = writeln!(out, " -> sufficient");
        }
    }
}

fn render_text(answer: &FinalAnswer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Query: {}", answer.query);
    let _ = writeln!(
        out,
        "Iterations: {} ({}), {} ms",
        answer.iterations,
        termination_label(answer.termination),
        answer.elapsed_ms
    );
    let _ = writeln!(out, "Partial: {}\n", if answer.partial { "yes" } else { "no" });
    let _ = writeln!(out, "{}\n", answer.answer);

    for record in answer.history.records() {
        render_iteration(&mut out, record);
    }

    if !answer.citations.is_empty() {
        let _ = writeln!(out, "\nCitations:");
        for citation in &answer.citations {
            let _ = writeln!(out, "  [{}] {}", citation.index, citation_line(citation));
        }
    }
    out
}

/// Abort summary for stderr: the reason, the last completed round and how
/// much evidence had been gathered.
pub fn render_abort(err: &PipelineAbortedError) -> String {
    let mut out = format!("retrieval aborted: {}", err.reason);
    if let Some(record) = &err.last_iteration {
        out.push('\n');
        render_iteration(&mut out, record);
    }
    let _ = write!(out, "\nevidence gathered: {} record(s)", err.evidence.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use codexgraph_graph_store::{FakeGraphStore, GraphReply, GraphRow};
    use codexgraph_llm::{CallSite, ScriptedModel, ScriptedReply};
    use codexgraph_retrieval::{AbortReason, Collaborators, PipelineConfig, run_query};
    use codexgraph_vector_store::VectorStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn class_row(name: &str, start: u64, end: u64) -> GraphRow {
        let Value::Object(columns) = json!({
            "name": name,
            "code": format!(r#"<CODE>{{"S":{start},"E":{end},"F":"pkg/shapes.py"}}</CODE>"#),
        }) else {
            unreachable!()
        };
        GraphRow::from_columns(columns)
    }

    async fn answer() -> FinalAnswer {
        let model = ScriptedModel::new()
            .with_default(
                CallSite::IntentExtraction,
                ScriptedReply::json(json!({"targets": ["class"]})),
            )
            .with_default(
                CallSite::Translation,
                ScriptedReply::json(json!({
                    "query": "MATCH (c:CLASS) RETURN c.name AS name, c.code AS code",
                    "confidence": 0.9
                })),
            )
            .with_default(CallSite::Synthesis, ScriptedReply::text("Two shapes [1][2]."));
        let graph = FakeGraphStore::default().with_default(GraphReply::Rows(vec![
            class_row("Circle", 1, 3),
            class_row("Square", 5, 6),
        ]));
        let collaborators = Collaborators {
            model: Arc::new(model),
            graph: Arc::new(graph),
            vectors: Arc::new(VectorStore::in_memory(Arc::new(
                codexgraph_embeddings::HashingEmbedder::default(),
            ))),
        };
        run_query(
            "list the classes",
            PipelineConfig::default(),
            collaborators,
            CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    fn generated_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_markdown_front_matter_and_citations() {
        let answer = answer().await;
        let report = render(&answer, ReportFormat::Markdown, generated_at(), None).unwrap();

        assert!(report.starts_with("---\nquery: \"list the classes\"\ngenerated: 2026-03-01T12:00:00"));
        assert!(report.contains("iterations: 1\n"));
        assert!(report.contains("partial: false\n"));
        assert!(report.contains("# Answer\n\nTwo shapes [1][2].\n"));
        assert!(report.contains("1. **CLASS Circle** `pkg/shapes.py:1-3` (graph, relevance 1.00)"));
        assert!(!report.contains("## Not found"));
    }

    #[tokio::test]
    async fn test_json_extracts_cited_code() {
        let answer = answer().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(
            dir.path().join("pkg/shapes.py"),
            "class Circle:\n    r = 1\n    pass\n\nclass Square:\n    pass\n",
        )
        .unwrap();

        let report = render(&answer, ReportFormat::Json, generated_at(), Some(dir.path())).unwrap();
        let value: Value = serde_json::from_str(&report).unwrap();

        assert_eq!(value["query"], "list the classes");
        assert_eq!(value["termination"], "sufficient");
        assert_eq!(value["citations"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["extracted_code"][0]["code"], "class Circle:\n    r = 1\n    pass");
        assert_eq!(value["extracted_code"][1]["code"], "class Square:\n    pass");
    }

    #[tokio::test]
    async fn test_json_without_code_root_has_no_extracts() {
        let answer = answer().await;
        let report = render(&answer, ReportFormat::Json, generated_at(), None).unwrap();
        let value: Value = serde_json::from_str(&report).unwrap();
        assert!(value.get("extracted_code").is_none());
        assert_eq!(value["state_trace"][0], "INIT");
    }

    #[tokio::test]
    async fn test_text_lists_iterations() {
        let answer = answer().await;
        let report = render(&answer, ReportFormat::Text, generated_at(), None).unwrap();

        assert!(report.contains("Iteration 1:\n  intent: targets [class]\n"));
        assert!(report.contains("  formal query: MATCH (c:CLASS) RETURN c.name AS name, c.code AS code (confidence 0.90)"));
        assert!(report.contains("  graph: returned 2 row(s)"));
        assert!(report.contains("-> sufficient"));
        assert!(report.contains("  [2] CLASS Square (pkg/shapes.py:5-6, graph, relevance 1.00)"));
    }

    #[test]
    fn test_abort_summary() {
        let err = PipelineAbortedError::new(AbortReason::CollaboratorsUnavailable);
        assert_eq!(
            render_abort(&err),
            "retrieval aborted: every enabled retrieval channel was unavailable\nevidence gathered: 0 record(s)"
        );
    }
}
