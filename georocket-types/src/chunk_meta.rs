use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const MIME_TYPE_XML: &str = "application/xml";
pub const MIME_TYPE_JSON: &str = "application/json";

/// Metadata attached to every chunk. It carries just enough structural
/// information to embed the chunk back into a valid enclosing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkMeta {
    Xml(XmlChunkMeta),
    GeoJson(GeoJsonChunkMeta),
}

impl ChunkMeta {
    pub fn mime_type(&self) -> &str {
        match self {
            ChunkMeta::Xml(m) => &m.mime_type,
            ChunkMeta::GeoJson(m) => &m.mime_type,
        }
    }
}

impl From<XmlChunkMeta> for ChunkMeta {
    fn from(m: XmlChunkMeta) -> Self {
        ChunkMeta::Xml(m)
    }
}

impl From<GeoJsonChunkMeta> for ChunkMeta {
    fn from(m: GeoJsonChunkMeta) -> Self {
        ChunkMeta::GeoJson(m)
    }
}

/// Metadata for a chunk extracted from an XML document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlChunkMeta {
    pub mime_type: String,

    /// The chain of XML start tags that enclosed the chunk in the source
    /// document, outermost first
    pub parents: Vec<XmlStartElement>,

    /// Byte offset of the chunk's first byte in the source stream
    pub start: usize,

    /// Byte offset just past the chunk's last byte in the source stream
    pub end: usize,

    /// Unknown fields are kept so they survive a round trip through the
    /// index backend
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl XmlChunkMeta {
    pub fn new(parents: Vec<XmlStartElement>, start: usize, end: usize) -> Self {
        Self {
            mime_type: MIME_TYPE_XML.to_string(),
            parents,
            start,
            end,
            extra: Map::new(),
        }
    }
}

/// An XML start tag with its namespace declarations and attributes. The
/// maps are ordered so the tag always serializes the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlStartElement {
    #[serde(default)]
    pub prefix: String,

    pub local_name: String,

    /// Namespace declarations on this tag, keyed by prefix. The default
    /// namespace uses the empty string.
    #[serde(default)]
    pub namespace_prefixes: BTreeMap<String, String>,

    /// Regular (non-namespace) attributes, keyed by their qualified name
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl XmlStartElement {
    pub fn with_local_name(local_name: &str) -> Self {
        Self {
            prefix: String::new(),
            local_name: local_name.to_string(),
            namespace_prefixes: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// The tag's qualified name, e.g. `gml:Building`
    pub fn name(&self) -> String {
        if self.prefix.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_name)
        }
    }
}

/// Metadata for a chunk extracted from a GeoJSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonChunkMeta {
    pub mime_type: String,

    /// The chunk object's own top-level `type` member
    #[serde(rename = "type")]
    pub kind: GeoJsonType,

    /// Name of the enclosing array member (`features` or `geometries`).
    /// `None` if the chunk was the top-level object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl GeoJsonChunkMeta {
    pub fn new(kind: GeoJsonType, parent_field_name: Option<String>) -> Self {
        Self {
            mime_type: MIME_TYPE_JSON.to_string(),
            kind,
            parent_field_name,
            extra: Map::new(),
        }
    }
}

/// The `type` member of a GeoJSON object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoJsonType {
    Feature,
    FeatureCollection,
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
    #[serde(other)]
    Unknown,
}

impl From<&str> for GeoJsonType {
    fn from(s: &str) -> Self {
        match s {
            "Feature" => GeoJsonType::Feature,
            "FeatureCollection" => GeoJsonType::FeatureCollection,
            "Point" => GeoJsonType::Point,
            "MultiPoint" => GeoJsonType::MultiPoint,
            "LineString" => GeoJsonType::LineString,
            "MultiLineString" => GeoJsonType::MultiLineString,
            "Polygon" => GeoJsonType::Polygon,
            "MultiPolygon" => GeoJsonType::MultiPolygon,
            "GeometryCollection" => GeoJsonType::GeometryCollection,
            _ => GeoJsonType::Unknown,
        }
    }
}
