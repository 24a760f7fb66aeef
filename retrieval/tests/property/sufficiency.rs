use codexgraph_graph_store::CodeLocation;
use codexgraph_retrieval::{
    Channel, EntityKind, EvidencePayload, EvidenceRecord, EvidenceSet, GraphOutcome,
    IterationSignals, Locator, PipelineConfig, RefinementDirective, ResultAggregator, SkipReason,
    StructuredIntent, SufficiencyEvaluator, SufficiencyWeights,
};
use proptest::prelude::*;
use serde_json::Map;

fn record_strategy() -> impl Strategy<Value = EvidenceRecord> {
    (
        prop::bool::ANY,
        0usize..8,
        0.0f64..=1.0,
        prop::option::of(prop::sample::select(EntityKind::ALL.to_vec())),
        prop::bool::ANY,
        prop::bool::ANY,
    )
        .prop_map(|(graph, file, relevance, kind, related, sourced)| {
            let path = format!("pkg/mod{file}.py");
            EvidenceRecord {
                channel: if graph { Channel::Graph } else { Channel::Semantic },
                locator: Locator::file_range(&path, 1, 9),
                payload: EvidencePayload::GraphRow {
                    columns: Map::new(),
                    labels: vec![],
                    node_ids: vec![],
                },
                relevance: if graph { 1.0 } else { relevance },
                supplementary_score: None,
                entity_kinds: kind.into_iter().collect(),
                relationships: if related { vec!["CONTAINS".to_string()] } else { vec![] },
                location: sourced.then(|| CodeLocation {
                    path,
                    start_line: 1,
                    end_line: 9,
                }),
                iteration: 1,
            }
        })
}

fn graph_outcome_strategy() -> impl Strategy<Value = GraphOutcome> {
    prop_oneof![
        (0usize..20).prop_map(|rows| GraphOutcome::Executed { rows }),
        prop::bool::ANY.prop_map(|unavailable| GraphOutcome::Failed {
            error: "failed".to_string(),
            unavailable,
        }),
        Just(GraphOutcome::Skipped { reason: SkipReason::ChannelDisabled }),
        Just(GraphOutcome::Skipped { reason: SkipReason::TranslationFailed }),
    ]
}

fn intent_strategy() -> impl Strategy<Value = StructuredIntent> {
    (
        prop::collection::vec(prop::sample::select(EntityKind::ALL.to_vec()), 0..4),
        prop::bool::ANY,
    )
        .prop_map(|(mut targets, ambiguous)| {
            targets.sort();
            targets.dedup();
            StructuredIntent {
                targets,
                ambiguous,
                ..Default::default()
            }
        })
}

fn evidence(records: Vec<EvidenceRecord>) -> EvidenceSet {
    let mut set = EvidenceSet::default();
    ResultAggregator.merge(&mut set, records);
    set
}

proptest! {
    #[test]
    fn evaluation_is_deterministic_and_bounded(
        records in prop::collection::vec(record_strategy(), 0..25),
        intent in intent_strategy(),
        graph in graph_outcome_strategy(),
        confidence in prop::option::of(0.0f64..=1.0),
        failures in 0usize..4,
        successes in 0usize..4,
    ) {
        let set = evidence(records);
        let evaluator = SufficiencyEvaluator::new(&PipelineConfig::default());
        let signals = IterationSignals {
            intent: Some(&intent),
            confidence,
            graph: &graph,
            graph_enabled: true,
            graph_failures: failures,
            graph_successes: successes,
        };

        let first = evaluator.evaluate(&set, &signals);
        let second = evaluator.evaluate(&set, &signals);
        prop_assert_eq!(&first, &second);

        let scores = first.scores;
        for value in [scores.coverage, scores.depth, scores.accuracy, scores.completeness, first.overall] {
            prop_assert!((0.0..=1.0).contains(&value), "score out of range: {}", value);
        }
    }

    #[test]
    fn pass_requires_threshold_and_floor(
        records in prop::collection::vec(record_strategy(), 0..25),
        intent in intent_strategy(),
        graph in graph_outcome_strategy(),
    ) {
        let config = PipelineConfig::default();
        let set = evidence(records);
        let signals = IterationSignals {
            intent: Some(&intent),
            confidence: Some(0.9),
            graph: &graph,
            graph_enabled: true,
            graph_failures: 0,
            graph_successes: 1,
        };

        let verdict = SufficiencyEvaluator::new(&config).evaluate(&set, &signals);

        let expected = verdict.overall >= config.sufficiency_threshold
            && verdict.scores.coverage >= config.coverage_floor;
        prop_assert_eq!(verdict.passed, expected);
        prop_assert_eq!(verdict.directive.is_none(), verdict.passed);
    }

    #[test]
    fn missing_kinds_have_no_evidence(
        records in prop::collection::vec(record_strategy(), 0..25),
        intent in intent_strategy(),
    ) {
        let set = evidence(records);
        let graph = GraphOutcome::Executed { rows: 1 };
        let signals = IterationSignals {
            intent: Some(&intent),
            confidence: None,
            graph: &graph,
            graph_enabled: true,
            graph_failures: 0,
            graph_successes: 1,
        };

        let verdict = SufficiencyEvaluator::new(&PipelineConfig::default()).evaluate(&set, &signals);
        let present = set.kinds();
        for kind in &verdict.missing_kinds {
            prop_assert!(intent.targets.contains(kind));
            prop_assert!(!present.contains(kind));
        }
    }
}

fn related_class_row(path: &str) -> EvidenceRecord {
    EvidenceRecord {
        channel: Channel::Graph,
        locator: Locator::file_range(path, 1, 9),
        payload: EvidencePayload::GraphRow {
            columns: Map::new(),
            labels: vec!["CLASS".to_string()],
            node_ids: vec![],
        },
        relevance: 1.0,
        supplementary_score: None,
        entity_kinds: vec![EntityKind::Class],
        relationships: vec!["HAS_METHOD".to_string()],
        location: Some(CodeLocation {
            path: path.to_string(),
            start_line: 1,
            end_line: 9,
        }),
        iteration: 1,
    }
}

fn targets(kinds: &[EntityKind]) -> StructuredIntent {
    StructuredIntent {
        targets: kinds.to_vec(),
        ..Default::default()
    }
}

fn executed<'a>(intent: &'a StructuredIntent, graph: &'a GraphOutcome) -> IterationSignals<'a> {
    IterationSignals {
        intent: Some(intent),
        confidence: Some(1.0),
        graph,
        graph_enabled: true,
        graph_failures: 0,
        graph_successes: 1,
    }
}

// Half coverage with every other axis at 1.0 weighs in at exactly 0.875.
fn half_covered() -> (EvidenceSet, StructuredIntent) {
    (
        evidence(vec![related_class_row("pkg/shapes.py")]),
        targets(&[EntityKind::Class, EntityKind::Method]),
    )
}

#[test]
fn passes_at_exact_threshold_and_floor() {
    let (set, intent) = half_covered();
    let graph = GraphOutcome::Executed { rows: 1 };
    let config = PipelineConfig {
        sufficiency_threshold: 0.875,
        coverage_floor: 0.5,
        ..Default::default()
    };

    let verdict = SufficiencyEvaluator::new(&config).evaluate(&set, &executed(&intent, &graph));

    assert_eq!(verdict.scores.coverage, 0.5);
    assert_eq!(verdict.overall, 0.875);
    assert!(verdict.passed);
    assert_eq!(verdict.directive, None);
}

#[test]
fn fails_just_below_threshold_at_floor() {
    let (set, intent) = half_covered();
    let graph = GraphOutcome::Executed { rows: 1 };
    let config = PipelineConfig {
        sufficiency_threshold: 0.875 + 1e-9,
        coverage_floor: 0.5,
        ..Default::default()
    };

    let verdict = SufficiencyEvaluator::new(&config).evaluate(&set, &executed(&intent, &graph));

    assert!(!verdict.passed);
    assert_eq!(verdict.directive, Some(RefinementDirective::Expand));
}

#[test]
fn coverage_just_below_floor_fails_despite_high_overall() {
    let (set, intent) = half_covered();
    let graph = GraphOutcome::Executed { rows: 1 };
    let config = PipelineConfig {
        sufficiency_threshold: 0.8,
        coverage_floor: 0.5 + 1e-9,
        ..Default::default()
    };

    let verdict = SufficiencyEvaluator::new(&config).evaluate(&set, &executed(&intent, &graph));

    assert!(verdict.overall >= config.sufficiency_threshold);
    assert!(!verdict.passed);
    assert_eq!(verdict.directive, Some(RefinementDirective::Expand));
    assert!(verdict.rationale.contains("below floor"));
}

#[test]
fn every_axis_at_one_passes_a_threshold_of_one() {
    let set = evidence(vec![related_class_row("pkg/shapes.py")]);
    let intent = targets(&[EntityKind::Class]);
    let graph = GraphOutcome::Executed { rows: 1 };
    let config = PipelineConfig {
        sufficiency_threshold: 1.0,
        ..Default::default()
    };

    let verdict = SufficiencyEvaluator::new(&config).evaluate(&set, &executed(&intent, &graph));

    let scores = verdict.scores;
    assert_eq!(
        [scores.coverage, scores.depth, scores.accuracy, scores.completeness],
        [1.0; 4]
    );
    assert_eq!(verdict.overall, 1.0);
    assert!(verdict.passed);
}

#[test]
fn empty_evidence_bottoms_out_every_evidence_axis() {
    let set = EvidenceSet::default();
    let intent = StructuredIntent {
        ambiguous: true,
        ..targets(&[EntityKind::Class])
    };
    let graph = GraphOutcome::Failed {
        error: "syntax error".to_string(),
        unavailable: false,
    };
    let signals = IterationSignals {
        graph_failures: 1,
        graph_successes: 0,
        ..executed(&intent, &graph)
    };

    let verdict = SufficiencyEvaluator::new(&PipelineConfig::default()).evaluate(&set, &signals);

    let scores = verdict.scores;
    assert_eq!([scores.coverage, scores.depth, scores.accuracy], [0.0; 3]);
    // Ambiguity never scores below half.
    assert_eq!(scores.completeness, 0.5);
    assert_eq!(verdict.overall, 0.125);
    assert!(!verdict.passed);
    assert_eq!(verdict.directive, Some(RefinementDirective::Pivot));
    assert_eq!(verdict.missing_kinds, vec![EntityKind::Class]);
}

#[test]
fn zero_weight_on_completeness_gives_zero_overall() {
    let set = EvidenceSet::default();
    let intent = targets(&[EntityKind::Class]);
    let graph = GraphOutcome::Failed {
        error: "syntax error".to_string(),
        unavailable: false,
    };
    let config = PipelineConfig {
        weights: SufficiencyWeights {
            completeness: 0.0,
            ..Default::default()
        },
        ..Default::default()
    };

    let verdict = SufficiencyEvaluator::new(&config).evaluate(&set, &executed(&intent, &graph));

    assert_eq!(verdict.overall, 0.0);
    assert!(!verdict.passed);
}
