use crate::evidence::{Channel, EvidenceRecord, EvidenceSet, Locator};

/// Merges channel output into the session's [`EvidenceSet`].
///
/// Records are keyed by locator. When both channels find the same locator,
/// the graph record is kept and the snippet's similarity becomes its
/// supplementary score; the snippet itself is held back and comes back if
/// the graph record is later discarded. Repeated snippets keep the
/// best-scoring copy. Merging the same batch twice changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    /// Merge `incoming` into `existing`; returns the records that were new,
    /// including graph records that took over a snippet's locator.
    pub fn merge(
        &self,
        existing: &mut EvidenceSet,
        incoming: Vec<EvidenceRecord>,
    ) -> Vec<EvidenceRecord> {
        let mut added = Vec::new();

        for record in incoming {
            let Some(index) = existing.position(&record.locator) else {
                added.push(record.clone());
                existing.push(record);
                continue;
            };
            let Some(current) = existing.record_mut(index) else {
                continue;
            };

            match (current.channel, record.channel) {
                (Channel::Graph, Channel::Semantic) => {
                    current.supplementary_score =
                        Some(max_score(current.supplementary_score, record.relevance));
                    existing.absorb(record);
                }
                (Channel::Semantic, Channel::Graph) => {
                    let mut graph = record;
                    graph.supplementary_score =
                        Some(max_score(graph.supplementary_score, current.relevance));
                    let snippet = std::mem::replace(current, graph.clone());
                    existing.absorb(snippet);
                    added.push(graph);
                }
                (Channel::Semantic, Channel::Semantic) => {
                    if record.relevance > current.relevance {
                        *current = record;
                    }
                }
                // Graph rows for the same locator: first one wins.
                (Channel::Graph, Channel::Graph) => {}
            }
        }

        existing.reorder();
        added
    }

    /// Drop every record from `channel`, returning the discarded locators.
    /// Snippets absorbed by a discarded graph record take its place.
    pub fn discard_channel(&self, existing: &mut EvidenceSet, channel: Channel) -> Vec<Locator> {
        let discarded: Vec<Locator> = existing
            .from_channel(channel)
            .map(|r| r.locator.clone())
            .collect();
        existing.retain(|r| r.channel != channel);

        if channel == Channel::Graph {
            for locator in &discarded {
                if let Some(snippet) = existing.take_absorbed(locator) {
                    existing.push(snippet);
                }
            }
            existing.reorder();
        }
        discarded
    }
}

fn max_score(current: Option<f64>, candidate: f64) -> f64 {
    match current {
        Some(score) => score.max(candidate),
        None => candidate,
    }
}
