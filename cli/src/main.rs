use clap::{Parser, Subcommand};
use codexgraph_cli::SchemaArgs;
use codexgraph_cli::query_cmd::{QueryArgs, QueryOutcome};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Answer questions about a codebase from its code property graph and vector index.
#[derive(Debug, Parser)]
#[command(name = "codexgraph", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a retrieval session and print its report
    Query(QueryArgs),

    /// Show the graph schema used for query translation
    Schema(SchemaArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Query(args) => {
            init_tracing(args.verbose);
            let outcome = args.run().await?;
            Ok(match outcome {
                QueryOutcome::Complete | QueryOutcome::Partial => ExitCode::SUCCESS,
                QueryOutcome::Aborted => ExitCode::from(1),
            })
        }
        Command::Schema(args) => {
            args.run()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
