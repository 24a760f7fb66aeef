//! Command-line front end: configuration loading, collaborator wiring and
//! report output for retrieval sessions.

pub mod config;
pub mod query_cmd;
pub mod report;

use anyhow::{Context, Result};
use clap::Parser;
use codexgraph_graph_store::GraphSchemaDescriptor;

#[derive(Debug, Parser)]
pub struct SchemaArgs {
    /// Print the descriptor as JSON
    #[arg(long)]
    pub json: bool,
}

impl SchemaArgs {
    pub fn run(&self) -> Result<()> {
        let schema = GraphSchemaDescriptor::code_property_graph();
        if self.json {
            let rendered =
                serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
            println!("{rendered}");
        } else {
            println!("{}", schema.describe());
        }
        Ok(())
    }
}
