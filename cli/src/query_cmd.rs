use crate::config::{CliConfig, EmbedderKind, VectorSection};
use crate::report::{ReportFormat, render, render_abort};
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use codexgraph_embeddings::{Embedder, EmbeddingService, HashingEmbedder};
use codexgraph_graph_store::{GraphSchemaDescriptor, Neo4jHttpStore};
use codexgraph_llm::OpenAiChatModel;
use codexgraph_retrieval::{ChannelMode, Collaborators, run_query};
use codexgraph_vector_store::VectorStore;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    Both,
    GraphOnly,
    SemanticOnly,
}

impl From<ChannelArg> for ChannelMode {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Both => ChannelMode::Both,
            ChannelArg::GraphOnly => ChannelMode::GraphOnly,
            ChannelArg::SemanticOnly => ChannelMode::SemanticOnly,
        }
    }
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Natural-language question about the codebase
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// TOML config file (defaults to ./codexgraph.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Retrieval channels to use
    #[arg(long, value_enum)]
    pub channels: Option<ChannelArg>,

    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Sufficiency threshold (0.0 - 1.0)
    #[arg(long, value_name = "F")]
    pub threshold: Option<f64>,

    /// JSON vector store built for this codebase
    #[arg(long, value_name = "PATH")]
    pub vector_store: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
    pub format: ReportFormat,

    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Source root used to attach cited code to JSON reports
    #[arg(long, value_name = "PATH")]
    pub code_root: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// How a `query` invocation ended, mapped to the process exit code by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Complete,
    Partial,
    Aborted,
}

impl QueryArgs {
    /// File, then environment, then flags.
    pub fn resolve_config(&self) -> Result<CliConfig> {
        let mut config = CliConfig::load(self.config.as_deref())?;
        config.apply_process_env()?;
        self.apply_flags(&mut config);
        Ok(config)
    }

    fn apply_flags(&self, config: &mut CliConfig) {
        if let Some(channels) = self.channels {
            config.pipeline.channels = channels.into();
        }
        if let Some(max_iterations) = self.max_iterations {
            config.pipeline.max_iterations = max_iterations;
        }
        if let Some(threshold) = self.threshold {
            config.pipeline.sufficiency_threshold = threshold;
        }
        if let Some(path) = &self.vector_store {
            config.vector.path = Some(path.clone());
        }
    }

    pub async fn run(self) -> Result<QueryOutcome> {
        let config = self.resolve_config()?;
        let collaborators = build_collaborators(&config).await?;

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling");
                    cancel.cancel();
                }
            })
        };
        let result = run_query(&self.text, config.pipeline, collaborators, cancel).await;
        ctrl_c.abort();

        let answer = match result {
            Ok(answer) => answer,
            Err(err) => {
                eprintln!("{} {}", "✗".bright_red(), render_abort(&err));
                return Ok(QueryOutcome::Aborted);
            }
        };

        let report = render(&answer, self.format, Local::now(), self.code_root.as_deref())?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, &report)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                info!(path = %path.display(), "report written");
                println!("{} Report written to {}", "✓".bright_green(), path.display());
            }
            None => print!("{report}"),
        }

        if answer.partial {
            eprintln!(
                "{} Partial answer after {} iteration(s): {}",
                "!".bright_yellow(),
                answer.iterations,
                answer.verdict.rationale
            );
            Ok(QueryOutcome::Partial)
        } else {
            Ok(QueryOutcome::Complete)
        }
    }
}

pub async fn build_collaborators(config: &CliConfig) -> Result<Collaborators> {
    let model =
        OpenAiChatModel::new(config.llm.clone()).context("failed to build language model client")?;
    let graph = Neo4jHttpStore::new(
        config.graph.clone(),
        GraphSchemaDescriptor::code_property_graph(),
    )
    .context("failed to build graph store client")?;
    let vectors = open_vector_store(&config.vector).await?;

    Ok(Collaborators {
        model: Arc::new(model),
        graph: Arc::new(graph),
        vectors: Arc::new(vectors),
    })
}

async fn open_vector_store(section: &VectorSection) -> Result<VectorStore> {
    let Some(path) = &section.path else {
        warn!("no vector store configured, semantic retrieval will find nothing");
        return Ok(VectorStore::in_memory(Arc::new(HashingEmbedder::default())));
    };

    let embedder: Arc<dyn Embedder> = match section.embedder {
        EmbedderKind::Fastembed => Arc::new(
            EmbeddingService::with_config(section.embedding.clone())
                .context("failed to load embedding model")?,
        ),
        EmbedderKind::Hashing => Arc::new(
            HashingEmbedder::new(section.hashing_dimension)
                .context("invalid hashing embedder dimension")?,
        ),
    };

    VectorStore::open(path, embedder)
        .await
        .with_context(|| format!("failed to open vector store {}", path.display()))
}
