use codexgraph_retrieval::{
    Channel, EntityKind, EvidencePayload, EvidenceRecord, EvidenceSet, Locator, ResultAggregator,
};
use proptest::prelude::*;
use serde_json::Map;
use std::collections::BTreeSet;

fn record_strategy() -> impl Strategy<Value = EvidenceRecord> {
    (
        prop::bool::ANY,
        0usize..6,
        1u64..4,
        0.0f64..=1.0,
        prop::sample::select(EntityKind::ALL.to_vec()),
    )
        .prop_map(|(graph, file, start, relevance, kind)| {
            let path = format!("src/file{file}.py");
            let locator = Locator::file_range(&path, start, start + 5);
            if graph {
                EvidenceRecord {
                    channel: Channel::Graph,
                    locator,
                    payload: EvidencePayload::GraphRow {
                        columns: Map::new(),
                        labels: vec![kind.label().to_string()],
                        node_ids: vec![],
                    },
                    relevance: 1.0,
                    supplementary_score: None,
                    entity_kinds: vec![kind],
                    relationships: vec![],
                    location: None,
                    iteration: 1,
                }
            } else {
                EvidenceRecord {
                    channel: Channel::Semantic,
                    locator,
                    payload: EvidencePayload::Snippet {
                        path,
                        language: None,
                        content: "pass".to_string(),
                    },
                    relevance,
                    supplementary_score: None,
                    entity_kinds: vec![kind],
                    relationships: vec![],
                    location: None,
                    iteration: 1,
                }
            }
        })
}

proptest! {
    #[test]
    fn merge_is_idempotent(batch in prop::collection::vec(record_strategy(), 0..30)) {
        let mut once = EvidenceSet::default();
        ResultAggregator.merge(&mut once, batch.clone());
        let mut twice = once.clone();
        let added = ResultAggregator.merge(&mut twice, batch);

        prop_assert!(added.is_empty());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_never_shrinks(
        first in prop::collection::vec(record_strategy(), 0..20),
        second in prop::collection::vec(record_strategy(), 0..20),
    ) {
        let mut set = EvidenceSet::default();
        ResultAggregator.merge(&mut set, first);
        let before = set.len();
        let known: BTreeSet<Locator> = set.iter().map(|r| r.locator.clone()).collect();
        let added = ResultAggregator.merge(&mut set, second);

        let fresh: BTreeSet<&Locator> = added
            .iter()
            .map(|r| &r.locator)
            .filter(|l| !known.contains(*l))
            .collect();
        prop_assert_eq!(set.len(), before + fresh.len());
        prop_assert!(added.iter().all(|r| set.get(&r.locator).is_some()));
    }

    #[test]
    fn locators_are_unique_and_ordered(batch in prop::collection::vec(record_strategy(), 0..40)) {
        let mut set = EvidenceSet::default();
        ResultAggregator.merge(&mut set, batch);

        let mut locators: Vec<&Locator> = set.iter().map(|r| &r.locator).collect();
        let total = locators.len();
        locators.sort();
        locators.dedup();
        prop_assert_eq!(locators.len(), total);

        for pair in set.records().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.channel <= b.channel);
            if a.channel == b.channel {
                prop_assert!(a.relevance >= b.relevance);
            }
        }
    }

    #[test]
    fn graph_wins_shared_locators(batch in prop::collection::vec(record_strategy(), 0..40)) {
        let mut set = EvidenceSet::default();
        ResultAggregator.merge(&mut set, batch.clone());

        for record in batch.iter().filter(|r| r.channel == Channel::Graph) {
            let merged = set.get(&record.locator);
            prop_assert_eq!(merged.map(|r| r.channel), Some(Channel::Graph));
        }
    }
}
