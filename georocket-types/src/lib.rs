pub mod bounding_box;
pub mod chunk_meta;
pub mod index_meta;
pub mod value;

pub use bounding_box::BoundingBox;
pub use chunk_meta::{ChunkMeta, GeoJsonChunkMeta, GeoJsonType, XmlChunkMeta, XmlStartElement};
pub use index_meta::IndexMeta;
pub use value::{IndexDocument, Value};
