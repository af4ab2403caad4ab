use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use humantime::format_duration;
use tokio::io::AsyncWriteExt;

use georocket_core::retriever::Retriever;

use super::Backend;

/// Search the GeoRocket data store
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// The search query; an empty query matches everything
    #[arg(default_value = "")]
    pub query: String,
}

/// Run the `search` command
pub async fn run_search(store_dir: &Path, args: SearchArgs) -> Result<()> {
    let backend = Backend::open(store_dir).await?;
    let retriever = Retriever::new(
        backend.store.clone(),
        backend.index.clone(),
        backend.registry.clone(),
    );

    let start = Instant::now();
    let mut stdout = tokio::io::stdout();
    let chunks = retriever.search(&args.query, &mut stdout).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    eprintln!(
        "Found {} chunks in {}",
        chunks,
        format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
    );
    Ok(())
}
