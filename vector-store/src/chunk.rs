use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata associated with a code chunk
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChunkMetadata {
    /// Programming language of the code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Entity kind of the chunk (`class`, `function`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the entity, when the chunker knew it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Timestamp when the chunk was indexed (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<i64>,

    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

/// A chunk of code with its location and content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    pub path: String,

    /// Starting line number (1-indexed)
    pub start_line: usize,

    /// Ending line number (1-indexed, inclusive)
    pub end_line: usize,

    pub content: String,

    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// Metadata filters applied before ranking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Case-insensitive language name
    pub language: Option<String>,
    /// Path prefix, compared after stripping a leading `./`
    pub path_prefix: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.path_prefix.is_none()
    }
}

impl CodeChunk {
    pub fn new(
        path: impl Into<String>,
        start_line: usize,
        end_line: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
            content: content.into(),
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = Some(language.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.metadata.kind = Some(kind.into());
        self
    }

    /// Get the number of lines in this chunk
    pub fn line_count(&self) -> usize {
        if self.end_line >= self.start_line {
            self.end_line - self.start_line + 1
        } else {
            0
        }
    }

    /// Whether this chunk passes every filter that is set.
    pub fn matches(&self, filters: &SearchFilters) -> bool {
        if let Some(language) = &filters.language {
            match &self.metadata.language {
                Some(own) if own.eq_ignore_ascii_case(language) => {}
                _ => return false,
            }
        }
        if let Some(prefix) = &filters.path_prefix {
            let prefix = normalize_path(prefix);
            if !normalize_path(&self.path).starts_with(prefix) {
                return false;
            }
        }
        true
    }
}

fn normalize_path(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}
