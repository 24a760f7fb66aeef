use anyhow::{Context, Result};
use codexgraph_embeddings::EmbeddingConfig;
use codexgraph_graph_store::Neo4jConfig;
use codexgraph_llm::OpenAiConfig;
use codexgraph_retrieval::PipelineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "codexgraph.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// fastembed model, downloaded on first use
    #[default]
    Fastembed,
    /// Deterministic token hashing, for indexes built offline
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorSection {
    /// JSON vector store; without one the semantic channel finds nothing
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub embedder: EmbedderKind,

    /// Must match the dimension the index was built with
    #[serde(default = "default_hashing_dimension")]
    pub hashing_dimension: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_hashing_dimension() -> usize {
    256
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            path: None,
            embedder: EmbedderKind::default(),
            hashing_dimension: default_hashing_dimension(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Everything the binary needs to build a session: the pipeline settings
/// plus one section per collaborator.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub llm: OpenAiConfig,
    #[serde(default)]
    pub graph: Neo4jConfig,
    #[serde(default)]
    pub vector: VectorSection,
}

impl CliConfig {
    /// Read `explicit`, or `./codexgraph.toml` when present, or fall back to
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(uri) = lookup("NEO4J_URI") {
            self.graph.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.graph.username = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.graph.password = password;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.graph.database = database;
        }
        if let Some(raw) = lookup("PIPELINE_MAX_ITERATIONS") {
            self.pipeline.max_iterations = raw.trim().parse().with_context(|| {
                format!("PIPELINE_MAX_ITERATIONS must be a positive integer, got {raw:?}")
            })?;
        }
        if let Some(raw) = lookup("PIPELINE_SUFFICIENCY_THRESHOLD") {
            self.pipeline.sufficiency_threshold = raw.trim().parse().with_context(|| {
                format!("PIPELINE_SUFFICIENCY_THRESHOLD must be a number, got {raw:?}")
            })?;
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
    }
}
