use std::collections::HashMap;
use std::sync::Arc;

use actson::feeder::PushJsonFeeder;
use actson::{JsonEvent, JsonParser};
use async_trait::async_trait;
use futures::stream::BoxStream;
use quick_xml::events::Event;
use quick_xml::Reader;

use georocket_types::{ChunkMeta, IndexDocument, IndexMeta, Value};

use crate::error::{Error, Result};
use crate::query::{IndexQuery, QueryPart};

pub mod fs;
pub mod geo_json;
pub mod memory;
pub mod meta;
pub mod xml;

pub use fs::FsIndex;
pub use memory::MemoryIndex;

/// The kind of event source a chunk has to be parsed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Xml,
    GeoJson,
}

impl SourceKind {
    pub fn from_mime_type(mime: &str) -> Result<Self> {
        match mime {
            "application/xml" | "text/xml" => Ok(SourceKind::Xml),
            "application/json" => Ok(SourceKind::GeoJson),
            _ => Err(Error::UnsupportedMimeType {
                mime: mime.to_string(),
            }),
        }
    }
}

/// A payload accompanying a JSON event, e.g. a field name or scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPayload {
    String(String),
    Int(i64),
    Double(f64),
    None,
}

/// The event type GeoJSON indexers are driven with
pub type GeoJsonEvent = (JsonEvent, JsonPayload);

/// Indexes chunks
pub trait Indexer<E> {
    /// Will be called on every stream `event` in the chunk
    fn on_event(&mut self, event: &E) -> Result<()>;

    /// Will be called when the whole chunk has been passed to the indexer.
    /// Returns the fields that should be added to the chunk's index
    /// document or an empty map if nothing should be added.
    fn make_result(&mut self) -> IndexDocument;

    /// Indexers that care about a fallback coordinate reference system
    /// return themselves here
    fn as_crs_aware(&mut self) -> Option<&mut dyn CrsAware> {
        None
    }
}

/// Capability of an indexer that needs to know which CRS to assume for
/// chunks that do not declare one
pub trait CrsAware {
    fn set_fallback_crs(&mut self, crs: &str);
}

pub type BoxedXmlIndexer = Box<dyn for<'a> Indexer<Event<'a>> + Send>;
pub type BoxedGeoJsonIndexer = Box<dyn Indexer<GeoJsonEvent> + Send>;

/// A freshly created indexer instance for one chunk
pub enum ChunkIndexer {
    Xml(BoxedXmlIndexer),
    GeoJson(BoxedGeoJsonIndexer),
}

/// How relevant an indexer factory considers itself for a query term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPriority {
    /// The factory's compiled query must match
    Must,

    /// The factory's compiled query is one of several alternatives
    Should,

    /// The factory cannot answer the term
    None,

    /// The factory is the sole producer for the term; all others are skipped
    Only,
}

/// Creates indexer instances and compiles query terms against the fields
/// those indexers produce
pub trait IndexerFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create a fresh indexer for a chunk of the given kind. Returns `None`
    /// if this factory does not handle the kind.
    fn create_indexer(&self, kind: SourceKind) -> Option<ChunkIndexer>;

    fn query_priority(&self, part: &QueryPart) -> QueryPriority;

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery>;
}

/// A stateless indexer that derives fields from chunk and import metadata
/// instead of the chunk's contents
pub trait MetaIndexer: Send + Sync {
    fn on_chunk(&self, path: &str, chunk_meta: &ChunkMeta, index_meta: &IndexMeta)
        -> IndexDocument;
}

/// One row handed to [`Index::add_many`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub path: String,
    pub chunk_meta: ChunkMeta,
    pub doc: IndexDocument,
}

/// An index stores information about chunks in a GeoRocket store and
/// answers queries over it. Implementations must be safe for concurrent
/// calls from multiple pipelines.
#[async_trait]
pub trait Index: Send + Sync {
    async fn add_many(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// All matching chunks as `(path, chunk meta)` pairs
    fn get_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<(String, ChunkMeta)>>;

    /// The distinct chunk metadata objects of all matching chunks
    fn get_distinct_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<ChunkMeta>>;

    fn get_paths<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<String>>;

    async fn delete_by_query(&self, query: &IndexQuery) -> Result<()>;

    /// Remove the given paths. Unknown paths are silently ignored.
    async fn delete_paths(&self, paths: &[String]) -> Result<()>;

    async fn add_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()>;

    async fn remove_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()>;

    async fn set_properties(
        &self,
        query: &IndexQuery,
        properties: HashMap<String, String>,
    ) -> Result<()>;

    async fn remove_properties(&self, query: &IndexQuery, keys: &[String]) -> Result<()>;

    fn get_property_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>>;

    fn get_attribute_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>>;

    fn get_collections(&self) -> BoxStream<'_, Result<String>>;

    async fn add_collection(&self, name: &str) -> Result<()>;

    async fn exists_collection(&self, name: &str) -> Result<bool>;

    async fn delete_collection(&self, name: &str) -> Result<()>;
}

/// The ordered set of indexer factories and meta indexers. Registration
/// order is fixed at startup and determines evaluation order everywhere.
pub struct IndexerRegistry {
    factories: Vec<Arc<dyn IndexerFactory>>,
    meta_indexers: Vec<Arc<dyn MetaIndexer>>,
}

impl IndexerRegistry {
    pub fn new(
        factories: Vec<Arc<dyn IndexerFactory>>,
        meta_indexers: Vec<Arc<dyn MetaIndexer>>,
    ) -> Self {
        Self {
            factories,
            meta_indexers,
        }
    }

    /// The registry with all built-in indexers
    pub fn with_defaults() -> Self {
        Self::new(
            vec![
                Arc::new(meta::DefaultMetaIndexerFactory),
                Arc::new(xml::BoundingBoxIndexerFactory),
                Arc::new(xml::GenericAttributeIndexerFactory),
                Arc::new(xml::GmlIdIndexerFactory),
                Arc::new(xml::XalAddressIndexerFactory),
                Arc::new(geo_json::GeoJsonIdIndexerFactory),
            ],
            vec![Arc::new(meta::DefaultMetaIndexer)],
        )
    }

    pub fn factories(&self) -> &[Arc<dyn IndexerFactory>] {
        &self.factories
    }

    /// Run all indexers over one chunk and produce its index document
    pub fn index_chunk(
        &self,
        path: &str,
        chunk: &[u8],
        chunk_meta: &ChunkMeta,
        index_meta: &IndexMeta,
    ) -> Result<(String, IndexDocument)> {
        let kind = SourceKind::from_mime_type(chunk_meta.mime_type())?;

        let mut doc = IndexDocument::new();
        match kind {
            SourceKind::Xml => {
                let mut indexers: Vec<BoxedXmlIndexer> = self
                    .factories
                    .iter()
                    .filter_map(|f| match f.create_indexer(kind) {
                        Some(ChunkIndexer::Xml(i)) => Some(i),
                        _ => None,
                    })
                    .collect();
                if let Some(crs) = &index_meta.fallback_crs {
                    for i in &mut indexers {
                        if let Some(aware) = i.as_mut().as_crs_aware() {
                            aware.set_fallback_crs(crs);
                        }
                    }
                }
                stream_xml_events(chunk, &mut indexers)?;
                for i in &mut indexers {
                    union_document(&mut doc, i.make_result());
                }
            }
            SourceKind::GeoJson => {
                let mut indexers: Vec<BoxedGeoJsonIndexer> = self
                    .factories
                    .iter()
                    .filter_map(|f| match f.create_indexer(kind) {
                        Some(ChunkIndexer::GeoJson(i)) => Some(i),
                        _ => None,
                    })
                    .collect();
                if let Some(crs) = &index_meta.fallback_crs {
                    for i in &mut indexers {
                        if let Some(aware) = i.as_mut().as_crs_aware() {
                            aware.set_fallback_crs(crs);
                        }
                    }
                }
                stream_json_events(chunk, &mut indexers)?;
                for i in &mut indexers {
                    union_document(&mut doc, i.make_result());
                }
            }
        }

        // metadata-derived fields win over chunk-derived ones
        for mi in &self.meta_indexers {
            for (k, v) in mi.on_chunk(path, chunk_meta, index_meta) {
                doc.insert(k, v);
            }
        }

        Ok((path.to_string(), doc))
    }
}

/// Re-parse a chunk's bytes and drive every indexer with its XML events.
/// Chunks are self-contained, so this is a plain synchronous pass.
fn stream_xml_events(chunk: &[u8], indexers: &mut [BoxedXmlIndexer]) -> Result<()> {
    let mut reader = Reader::from_reader(chunk);
    let mut buf = Vec::new();
    loop {
        let e = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::malformed_input(reader.buffer_position(), e.to_string()))?;
        if e == Event::Eof {
            break;
        }
        for i in indexers.iter_mut() {
            i.on_event(&e)?;
        }
        buf.clear();
    }
    Ok(())
}

/// Drive every indexer with the JSON events of a chunk
fn stream_json_events(chunk: &[u8], indexers: &mut [BoxedGeoJsonIndexer]) -> Result<()> {
    let mut parser = JsonParser::new(PushJsonFeeder::new());
    let mut pos = 0;
    loop {
        let event = parser.next_event();
        match event {
            Ok(Some(JsonEvent::NeedMoreInput)) => {
                pos += parser.feeder.push_bytes(&chunk[pos..]);
                if pos == chunk.len() {
                    parser.feeder.done();
                }
            }
            Err(_) => {
                return Err(Error::malformed_input(
                    parser.parsed_bytes(),
                    "invalid JSON in chunk",
                ));
            }
            Ok(None) => break,
            Ok(Some(event)) => {
                let payload = json_payload(&mut parser, event)?;
                let e = (event, payload);
                for i in indexers.iter_mut() {
                    i.on_event(&e)?;
                }
            }
        }
    }
    Ok(())
}

/// Extract the payload accompanying a JSON event
fn json_payload(parser: &mut JsonParser<PushJsonFeeder>, event: JsonEvent) -> Result<JsonPayload> {
    let payload = match event {
        JsonEvent::FieldName | JsonEvent::ValueString => {
            let s = parser
                .current_str()
                .map_err(|e| Error::malformed_input(parser.parsed_bytes(), e.to_string()))?;
            JsonPayload::String(s.to_string())
        }
        JsonEvent::ValueInt => {
            let s = parser
                .current_str()
                .map_err(|e| Error::malformed_input(parser.parsed_bytes(), e.to_string()))?;
            JsonPayload::Int(s.parse().map_err(|_| {
                Error::malformed_input(parser.parsed_bytes(), "invalid integer literal")
            })?)
        }
        JsonEvent::ValueFloat => {
            let s = parser
                .current_str()
                .map_err(|e| Error::malformed_input(parser.parsed_bytes(), e.to_string()))?;
            JsonPayload::Double(s.parse().map_err(|_| {
                Error::malformed_input(parser.parsed_bytes(), "invalid number literal")
            })?)
        }
        _ => JsonPayload::None,
    };
    Ok(payload)
}

/// Merge one indexer's result into the chunk's document. Distinct indexers
/// produce disjoint top-level fields except for the well-known aggregates
/// (`genAttrs`, `props`, `tags`), whose contents are combined.
fn union_document(target: &mut IndexDocument, source: IndexDocument) {
    for (k, v) in source {
        match (target.get_mut(&k), v) {
            (Some(Value::Object(existing)), Value::Object(new)) => {
                existing.extend(new);
            }
            (Some(Value::List(existing)), Value::List(new)) => {
                existing.extend(new);
            }
            (_, v) => {
                target.insert(k, v);
            }
        }
    }
}

/// Drive a single indexer with the JSON events of a document (test helper)
#[cfg(test)]
pub(crate) fn drive_json_indexer<I>(json: &str, indexer: &mut I)
where
    I: Indexer<GeoJsonEvent>,
{
    let chunk = json.as_bytes();
    let mut parser = JsonParser::new(PushJsonFeeder::new());
    let mut pos = 0;
    loop {
        let event = parser.next_event();
        match event {
            Ok(Some(JsonEvent::NeedMoreInput)) => {
                pos += parser.feeder.push_bytes(&chunk[pos..]);
                if pos == chunk.len() {
                    parser.feeder.done();
                }
            }
            Err(_) => panic!("invalid JSON in test fixture"),
            Ok(None) => break,
            Ok(Some(event)) => {
                let payload = json_payload(&mut parser, event).unwrap();
                indexer.on_event(&(event, payload)).unwrap();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use georocket_types::{GeoJsonChunkMeta, GeoJsonType, IndexMeta, XmlChunkMeta, Value};

    use super::{IndexerRegistry, SourceKind};
    use crate::error::Error;

    #[test]
    fn source_kind_from_mime_type() {
        assert_eq!(
            SourceKind::from_mime_type("application/xml").unwrap(),
            SourceKind::Xml
        );
        assert_eq!(
            SourceKind::from_mime_type("text/xml").unwrap(),
            SourceKind::Xml
        );
        assert_eq!(
            SourceKind::from_mime_type("application/json").unwrap(),
            SourceKind::GeoJson
        );
        assert!(matches!(
            SourceKind::from_mime_type("image/png"),
            Err(Error::UnsupportedMimeType { mime }) if mime == "image/png"
        ));
    }

    #[test]
    fn index_xml_chunk() {
        let chunk = br#"<f gml:id="F1"><gml:pos srsName="EPSG:4326">1 2</gml:pos></f>"#;
        let meta = XmlChunkMeta::new(vec![], 0, chunk.len()).into();
        let index_meta = IndexMeta::new("c1", 0).with_tags(["test"]);

        let registry = IndexerRegistry::with_defaults();
        let (path, doc) = registry
            .index_chunk("p1", chunk, &meta, &index_meta)
            .unwrap();

        assert_eq!(path, "p1");
        assert_eq!(doc["gmlIds"], Value::List(vec!["F1".into()]));
        assert_eq!(
            doc["bbox"],
            Value::List(vec![1.0.into(), 2.0.into(), 1.0.into(), 2.0.into()])
        );
        assert_eq!(doc["tags"], Value::List(vec!["test".into()]));
        assert_eq!(doc["correlationId"], Value::String("c1".to_string()));
    }

    #[test]
    fn index_geo_json_chunk() {
        let chunk = br#"{"type":"Feature","id":"F1","geometry":{"type":"Point","coordinates":[1,2]},"properties":{"name":"x"}}"#;
        let meta = GeoJsonChunkMeta::new(GeoJsonType::Feature, None).into();
        let index_meta = IndexMeta::new("c1", 0);

        let registry = IndexerRegistry::with_defaults();
        let (_, doc) = registry
            .index_chunk("p1", chunk, &meta, &index_meta)
            .unwrap();

        assert_eq!(doc["geoJsonFeatureIds"], Value::List(vec!["F1".into()]));
        assert_eq!(
            doc["bbox"],
            Value::List(vec![1.0.into(), 2.0.into(), 1.0.into(), 2.0.into()])
        );
    }

    #[test]
    fn unsupported_mime_type() {
        let mut meta = XmlChunkMeta::new(vec![], 0, 0);
        meta.mime_type = "application/x-unknown".to_string();
        let registry = IndexerRegistry::with_defaults();
        let r = registry.index_chunk("p", b"<a/>", &meta.into(), &IndexMeta::new("c", 0));
        assert!(matches!(r, Err(Error::UnsupportedMimeType { .. })));
    }
}
