mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use skill_shadow::{config, server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skill-shadow", version, about = "Thought-trace notebook with semantic search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP service
    Serve,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Check the trace store and vector index for corruption and drift
    Doctor,
    /// Re-embed every stored trace and rewrite the vector index
    Reindex,
    /// Semantic search from the terminal
    Search {
        /// Free-text query
        query: String,
        /// Number of traces to return
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.skill-shadow/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::SkillShadowConfig::load()?;

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve_http(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
        Command::Reindex => {
            cli::reindex::reindex(&config).await?;
        }
        Command::Search { query, top_k } => {
            cli::search::search(&config, &query, top_k).await?;
        }
    }

    Ok(())
}
