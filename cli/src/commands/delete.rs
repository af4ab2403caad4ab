use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use humantime::format_duration;

use georocket_core::query::compile;

use super::Backend;

/// Delete from the GeoRocket data store
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// A search query selecting the chunks to delete
    pub query: String,
}

/// Run the `delete` command
pub async fn run_delete(store_dir: &Path, args: DeleteArgs) -> Result<()> {
    let backend = Backend::open(store_dir).await?;
    let coordinator = backend.coordinator();

    let start = Instant::now();
    let query = compile(&args.query, backend.registry.factories())?;
    let deleted = coordinator.delete_by_query(&query).await?;

    println!(
        "Deleted {} chunks in {}",
        deleted,
        format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
    );
    Ok(())
}
