mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use emb::config::EmbConfig;

#[derive(Parser)]
#[command(name = "emb", version, about = "Similarity-driven experience graph builder")]
struct Cli {
    /// Config file (default: ~/.emb/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build similarity edges over a node file and print them as JSON
    Edges(cli::edges::EdgesArgs),
    /// Print the nearest indexed neighbors of one node
    Search(cli::search::SearchArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EmbConfig::load_from(path)?,
        None => EmbConfig::load()?,
    };

    // Log to stderr so stdout stays clean for JSON output.
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Edges(args) => cli::edges::edges(&config, args).await?,
        Command::Search(args) => cli::search::search(&config, args).await?,
    }

    Ok(())
}
