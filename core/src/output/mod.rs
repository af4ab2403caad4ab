use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use georocket_types::ChunkMeta;

use crate::error::Result;

pub mod geo_json;
pub mod xml;

pub use geo_json::GeoJsonMerger;
pub use xml::XmlMerger;

/// The byte sink mergers write into
pub type MergeSink = dyn AsyncWrite + Unpin + Send;

/// Merges chunks back into a syntactically valid document. Chunk bytes are
/// written verbatim; only the enclosing frame is synthesized from the
/// chunks' metadata.
#[async_trait]
pub trait Merger: Send {
    /// Merge a chunk with the given metadata into the output
    async fn merge(&mut self, chunk: &[u8], meta: &ChunkMeta, out: &mut MergeSink) -> Result<()>;

    /// Finish merging, closing the enclosing frame
    async fn finish(&mut self, out: &mut MergeSink) -> Result<()>;
}

pub(crate) async fn write_all(out: &mut MergeSink, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes).await?;
    Ok(())
}
