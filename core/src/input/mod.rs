use georocket_types::ChunkMeta;

pub mod geo_json;
pub mod xml;

pub use geo_json::GeoJsonSplitter;
pub use xml::FirstLevelSplitter;

/// A chunk produced by a splitter together with the metadata needed to
/// embed it back into a valid enclosing document
#[derive(Debug, Clone, PartialEq)]
pub struct SplitterResult {
    pub chunk: Vec<u8>,
    pub meta: ChunkMeta,
}
