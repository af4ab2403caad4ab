use georocket_types::{ChunkMeta, IndexDocument, IndexMeta, Value};

use crate::index::{ChunkIndexer, IndexerFactory, MetaIndexer, QueryPriority, SourceKind};
use crate::query::{IndexQuery, QueryPart};

/// Records the import request's metadata (correlation id, filename,
/// timestamp, tags, properties, fallback CRS) in every chunk's index
/// document
pub struct DefaultMetaIndexer;

impl MetaIndexer for DefaultMetaIndexer {
    fn on_chunk(
        &self,
        _path: &str,
        _chunk_meta: &ChunkMeta,
        index_meta: &IndexMeta,
    ) -> IndexDocument {
        let mut doc = IndexDocument::new();
        doc.insert(
            "correlationId".to_string(),
            Value::String(index_meta.correlation_id.clone()),
        );
        if let Some(filename) = &index_meta.filename {
            doc.insert("filename".to_string(), Value::String(filename.clone()));
        }
        doc.insert(
            "importTimestamp".to_string(),
            Value::Integer(index_meta.timestamp),
        );
        doc.insert(
            "tags".to_string(),
            Value::List(
                index_meta
                    .tags
                    .iter()
                    .map(|t| Value::String(t.clone()))
                    .collect(),
            ),
        );
        doc.insert(
            "props".to_string(),
            Value::Object(
                index_meta
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
        if let Some(crs) = &index_meta.fallback_crs {
            doc.insert("fallbackCRS".to_string(), Value::String(crs.clone()));
        }
        doc
    }
}

/// Compiles queries against the metadata fields: free-form terms match
/// tags, key-value terms match properties
pub struct DefaultMetaIndexerFactory;

impl IndexerFactory for DefaultMetaIndexerFactory {
    fn name(&self) -> &'static str {
        "defaultMeta"
    }

    fn create_indexer(&self, _kind: SourceKind) -> Option<ChunkIndexer> {
        None
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) | QueryPart::KeyValue(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(s) => Some(IndexQuery::contains("tags", s.value.clone())),
            QueryPart::KeyValue(kv) => Some(IndexQuery::Compare {
                field: format!("props.{}", kv.key),
                value: kv.value.clone(),
                op: kv.op,
            }),
            _ => None,
        }
    }
}
