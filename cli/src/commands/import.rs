use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Args;
use humantime::format_duration;
use ulid::Ulid;

use georocket_core::importer::Importer;
use georocket_types::IndexMeta;

use super::Backend;

/// Import a file into the GeoRocket data store
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// The file to import
    pub file: PathBuf,

    /// Destination layer
    #[arg(long, default_value = "")]
    pub layer: String,

    /// Mime type of the file; derived from the extension if omitted
    #[arg(long)]
    pub mime: Option<String>,

    /// Tag to attach to every imported chunk (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// key=value property to attach to every imported chunk (repeatable)
    #[arg(long = "prop")]
    pub properties: Vec<String>,

    /// Coordinate reference system to assume for chunks without one
    #[arg(long)]
    pub fallback_crs: Option<String>,
}

/// Run the `import` command
pub async fn run_import(store_dir: &Path, args: ImportArgs) -> Result<()> {
    let backend = Backend::open(store_dir).await?;
    let importer = Importer::new(backend.store.clone(), backend.coordinator());

    let mime = match &args.mime {
        Some(m) => m.clone(),
        None => mime_from_extension(&args.file)?,
    };

    let mut properties = Vec::new();
    for p in &args.properties {
        let Some((key, value)) = p.split_once('=') else {
            bail!("property `{p}' is not in key=value form");
        };
        properties.push((key.to_string(), value.to_string()));
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    let mut meta = IndexMeta::new(Ulid::new().to_string(), timestamp)
        .with_tags(args.tags.clone())
        .with_properties(properties);
    if let Some(name) = args.file.file_name().and_then(|n| n.to_str()) {
        meta = meta.with_filename(name);
    }
    if let Some(crs) = &args.fallback_crs {
        meta = meta.with_fallback_crs(crs.clone());
    }

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("unable to open `{}'", args.file.display()))?;

    let report = importer.import(file, &mime, meta, &args.layer).await?;

    println!(
        "Imported {} chunks in {}",
        report.chunks,
        format_duration(Duration::from_millis(report.millis as u64))
    );
    Ok(())
}

fn mime_from_extension(file: &Path) -> Result<String> {
    match file.extension().and_then(|e| e.to_str()) {
        Some("json") | Some("geojson") => Ok("application/json".to_string()),
        Some("xml") | Some("gml") => Ok("application/xml".to_string()),
        _ => bail!(
            "unable to derive the mime type of `{}'; specify --mime",
            file.display()
        ),
    }
}
