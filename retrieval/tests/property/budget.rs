use async_trait::async_trait;
use codexgraph_graph_store::{FakeGraphStore, GraphReply, GraphRow};
use codexgraph_llm::{CallSite, ScriptedModel, ScriptedReply};
use codexgraph_retrieval::{Collaborators, PipelineConfig, Termination, VectorIndex, run_query};
use codexgraph_vector_store::{CodeChunk, SearchFilters, SearchResult, VectorStoreError};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct StaticIndex {
    hits: Vec<SearchResult>,
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn similarity_search(
        &self,
        _text: &str,
        k: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

fn class_row(i: usize) -> GraphRow {
    let Value::Object(columns) = json!({
        "name": format!("Widget{i}"),
        "code": format!(r#"<CODE>{{"S":{},"E":{},"F":"ui/widgets.py"}}</CODE>"#, i * 10 + 1, i * 10 + 8),
    }) else {
        unreachable!()
    };
    GraphRow::from_columns(columns)
}

fn model(intent_works: bool) -> ScriptedModel {
    let intent = if intent_works {
        ScriptedReply::json(json!({"targets": ["class", "method"], "relationships": ["HAS_METHOD"]}))
    } else {
        ScriptedReply::Error("model offline".into())
    };
    ScriptedModel::new()
        .with_default(CallSite::IntentExtraction, intent)
        .with_default(
            CallSite::Translation,
            ScriptedReply::json(json!({
                "query": "MATCH (c:CLASS) RETURN c.name AS name, c.code AS code",
                "confidence": 0.6
            })),
        )
        .with_default(CallSite::Synthesis, ScriptedReply::text("Widgets [1]."))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn iterations_never_exceed_budget(
        max_iterations in 1usize..6,
        rows in 0usize..15,
        hits in 0usize..5,
        intent_works in prop::bool::ANY,
    ) {
        let graph = FakeGraphStore::default()
            .with_default(GraphReply::Rows((0..rows).map(class_row).collect()));
        let index = StaticIndex {
            hits: (0..hits)
                .map(|i| SearchResult {
                    chunk: CodeChunk::new(format!("ui/panel{i}.py"), 1, 12, "class Panel: pass")
                        .with_kind("class"),
                    score: 0.7,
                })
                .collect(),
        };
        let collaborators = Collaborators {
            model: Arc::new(model(intent_works)),
            graph: Arc::new(graph),
            vectors: Arc::new(index),
        };
        let config = PipelineConfig {
            max_iterations,
            ..PipelineConfig::default()
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let answer = runtime
            .block_on(run_query("classes and their methods", config, collaborators, CancellationToken::new()))
            .unwrap();

        prop_assert!(answer.iterations >= 1);
        prop_assert!(answer.iterations <= max_iterations);
        prop_assert_eq!(answer.history.len(), answer.iterations);
        prop_assert_eq!(answer.partial, answer.termination == Termination::BudgetExhausted);
        if answer.partial {
            prop_assert_eq!(answer.iterations, max_iterations);
        }
        if !intent_works {
            prop_assert!(answer.partial);
        }
    }
}
