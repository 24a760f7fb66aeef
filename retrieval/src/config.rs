use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which retrieval channels a session may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    GraphOnly,
    SemanticOnly,
    #[default]
    Both,
}

impl ChannelMode {
    pub fn graph_enabled(self) -> bool {
        matches!(self, ChannelMode::GraphOnly | ChannelMode::Both)
    }

    pub fn semantic_enabled(self) -> bool {
        matches!(self, ChannelMode::SemanticOnly | ChannelMode::Both)
    }
}

/// Relative weight of each sufficiency axis in the overall score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SufficiencyWeights {
    #[serde(default = "default_weight")]
    pub coverage: f64,
    #[serde(default = "default_weight")]
    pub depth: f64,
    #[serde(default = "default_weight")]
    pub accuracy: f64,
    #[serde(default = "default_weight")]
    pub completeness: f64,
}

fn default_weight() -> f64 {
    0.25
}

impl Default for SufficiencyWeights {
    fn default() -> Self {
        Self {
            coverage: default_weight(),
            depth: default_weight(),
            accuracy: default_weight(),
            completeness: default_weight(),
        }
    }
}

impl SufficiencyWeights {
    pub fn total(&self) -> f64 {
        self.coverage + self.depth + self.accuracy + self.completeness
    }
}

/// Read-only settings for one retrieval session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hard ceiling on translation/execution rounds
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Weighted mean score required to stop refining (0.0 - 1.0)
    #[serde(default = "default_sufficiency_threshold")]
    pub sufficiency_threshold: f64,

    /// Coverage below this fails the verdict regardless of the mean
    #[serde(default = "default_coverage_floor")]
    pub coverage_floor: f64,

    #[serde(default)]
    pub weights: SufficiencyWeights,

    /// Timeout applied to every collaborator call, in milliseconds
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,

    #[serde(default)]
    pub channels: ChannelMode,

    /// Snippets requested from the vector index per round
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Snippets scoring below this are dropped
    #[serde(default)]
    pub semantic_min_score: f32,

    /// Remove graph evidence when acting on a `pivot` directive
    #[serde(default = "default_true")]
    pub pivot_discards_structural_evidence: bool,

    /// Citations attached to the final answer
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
}

fn default_max_iterations() -> usize {
    3
}

fn default_sufficiency_threshold() -> f64 {
    0.8
}

fn default_coverage_floor() -> f64 {
    0.5
}

fn default_agent_timeout_ms() -> u64 {
    30_000
}

fn default_semantic_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_citations() -> usize {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            sufficiency_threshold: default_sufficiency_threshold(),
            coverage_floor: default_coverage_floor(),
            weights: SufficiencyWeights::default(),
            agent_timeout_ms: default_agent_timeout_ms(),
            channels: ChannelMode::default(),
            semantic_top_k: default_semantic_top_k(),
            semantic_min_score: 0.0,
            pivot_discards_structural_evidence: true,
            max_citations: default_max_citations(),
        }
    }
}

impl PipelineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be >= 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.sufficiency_threshold) {
            return Err(format!(
                "sufficiency_threshold must be in [0.0, 1.0], got {}",
                self.sufficiency_threshold
            ));
        }

        if !(0.0..=1.0).contains(&self.coverage_floor) {
            return Err(format!(
                "coverage_floor must be in [0.0, 1.0], got {}",
                self.coverage_floor
            ));
        }

        let w = &self.weights;
        for (name, value) in [
            ("coverage", w.coverage),
            ("depth", w.depth),
            ("accuracy", w.accuracy),
            ("completeness", w.completeness),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("weights.{name} must be >= 0, got {value}"));
            }
        }
        if w.total() <= 0.0 {
            return Err("weights must not all be zero".to_string());
        }

        if self.agent_timeout_ms == 0 {
            return Err("agent_timeout_ms must be > 0".to_string());
        }

        if self.semantic_top_k == 0 {
            return Err("semantic_top_k must be > 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.semantic_min_score) {
            return Err(format!(
                "semantic_min_score must be in [0.0, 1.0], got {}",
                self.semantic_min_score
            ));
        }

        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Single round, lenient threshold
    pub fn fast() -> Self {
        Self {
            max_iterations: 1,
            sufficiency_threshold: 0.6,
            agent_timeout_ms: 15_000,
            ..Default::default()
        }
    }

    /// More rounds and a stricter threshold
    pub fn thorough() -> Self {
        Self {
            max_iterations: 5,
            sufficiency_threshold: 0.85,
            coverage_floor: 0.75,
            semantic_top_k: 20,
            ..Default::default()
        }
    }
}
