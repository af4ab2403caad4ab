use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{
    delete::{run_delete, DeleteArgs},
    import::{run_import, ImportArgs},
    search::{run_search, SearchArgs},
};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about = "A high-performance data store for geospatial files")]
struct Cli {
    /// Directory holding the chunk store and the index
    #[arg(long, global = true, default_value = "georocket-data")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a file into the data store
    Import(ImportArgs),

    /// Search the data store and write the merged result to standard output
    Search(SearchArgs),

    /// Delete all chunks matching a query
    Delete(DeleteArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => run_import(&cli.store, args).await,
        Commands::Search(args) => run_search(&cli.store, args).await,
        Commands::Delete(args) => run_delete(&cli.store, args).await,
    }
}
