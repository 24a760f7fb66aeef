//! Evidence records gathered by the retrieval channels.

use crate::intent::EntityKind;
use codexgraph_graph_store::CodeLocation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Retrieval channel that produced a record. Graph sorts before semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Graph,
    Semantic,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Graph => f.write_str("graph"),
            Channel::Semantic => f.write_str("semantic"),
        }
    }
}

/// Canonical identity of a piece of evidence, shared across channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Locator {
    /// Graph element id, or a content hash for rows without one.
    GraphElement { id: String },
    FileRange {
        path: String,
        start_line: u64,
        end_line: u64,
    },
}

impl Locator {
    pub fn file_range(path: &str, start_line: u64, end_line: u64) -> Self {
        Locator::FileRange {
            path: normalize_path(path),
            start_line,
            end_line,
        }
    }
}

impl From<&CodeLocation> for Locator {
    fn from(location: &CodeLocation) -> Self {
        Locator::file_range(&location.path, location.start_line, location.end_line)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::GraphElement { id } => write!(f, "graph:{id}"),
            Locator::FileRange {
                path,
                start_line,
                end_line,
            } => write!(f, "{path}:{start_line}-{end_line}"),
        }
    }
}

fn normalize_path(path: &str) -> String {
    path.trim().trim_start_matches("./").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidencePayload {
    GraphRow {
        columns: Map<String, Value>,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default)]
        node_ids: Vec<String>,
    },
    Snippet {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        content: String,
    },
}

/// One unit of retrieved evidence. Never mutated once merged, apart from
/// absorbing the score of a semantic duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub channel: Channel,
    pub locator: Locator,
    pub payload: EvidencePayload,
    /// 1.0 for graph rows, similarity score for snippets
    pub relevance: f64,
    /// Score of a semantic hit folded into this graph record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_score: Option<f64>,
    #[serde(default)]
    pub entity_kinds: Vec<EntityKind>,
    /// Relationship types the record connects through
    #[serde(default)]
    pub relationships: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<CodeLocation>,
    /// Iteration that produced the record
    pub iteration: usize,
}

impl EvidenceRecord {
    pub fn has_relationship_context(&self) -> bool {
        !self.relationships.is_empty()
    }

    pub fn has_source_context(&self) -> bool {
        self.location.is_some()
            || matches!(&self.payload, EvidencePayload::Snippet { content, .. } if !content.is_empty())
    }

    /// Short human label: entity name for graph rows, path for snippets.
    pub fn title(&self) -> String {
        match &self.payload {
            EvidencePayload::GraphRow { columns, .. } => {
                let name = columns
                    .iter()
                    .find(|(key, _)| *key == "name" || key.ends_with(".name"))
                    .and_then(|(_, v)| v.as_str())
                    .or_else(|| {
                        columns
                            .values()
                            .filter_map(Value::as_object)
                            .find_map(|props| props.get("name").and_then(Value::as_str))
                    });
                let kind = self
                    .entity_kinds
                    .first()
                    .map(|k| k.label())
                    .unwrap_or("NODE");
                match name {
                    Some(name) => format!("{kind} {name}"),
                    None => format!("{kind} {}", self.locator),
                }
            }
            EvidencePayload::Snippet { path, .. } => path.clone(),
        }
    }
}

/// Merged, deduplicated evidence in presentation order: graph records
/// first, then descending relevance, then insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceSet {
    records: Vec<EvidenceRecord>,
    /// Snippets folded into a graph record at the same locator, restored if
    /// that graph record is discarded.
    #[serde(skip)]
    absorbed: Vec<EvidenceRecord>,
}

impl EvidenceSet {
    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, locator: &Locator) -> Option<&EvidenceRecord> {
        self.records.iter().find(|r| &r.locator == locator)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvidenceRecord> {
        self.records.iter()
    }

    pub fn from_channel(&self, channel: Channel) -> impl Iterator<Item = &EvidenceRecord> {
        self.records.iter().filter(move |r| r.channel == channel)
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self
            .records
            .iter()
            .flat_map(|r| r.entity_kinds.iter().copied())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub(crate) fn position(&self, locator: &Locator) -> Option<usize> {
        self.records.iter().position(|r| &r.locator == locator)
    }

    pub(crate) fn push(&mut self, record: EvidenceRecord) {
        self.records.push(record);
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> Option<&mut EvidenceRecord> {
        self.records.get_mut(index)
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&EvidenceRecord) -> bool) {
        self.records.retain(keep);
    }

    /// Keep the best-scoring snippet seen behind a graph record.
    pub(crate) fn absorb(&mut self, snippet: EvidenceRecord) {
        match self.absorbed.iter_mut().find(|r| r.locator == snippet.locator) {
            Some(current) if snippet.relevance > current.relevance => *current = snippet,
            Some(_) => {}
            None => self.absorbed.push(snippet),
        }
    }

    pub(crate) fn take_absorbed(&mut self, locator: &Locator) -> Option<EvidenceRecord> {
        let index = self.absorbed.iter().position(|r| &r.locator == locator)?;
        Some(self.absorbed.remove(index))
    }

    /// Stable sort into presentation order.
    pub(crate) fn reorder(&mut self) {
        self.records.sort_by(|a, b| {
            a.channel
                .cmp(&b.channel)
                .then_with(|| b.relevance.total_cmp(&a.relevance))
        });
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a EvidenceRecord;
    type IntoIter = std::slice::Iter<'a, EvidenceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
