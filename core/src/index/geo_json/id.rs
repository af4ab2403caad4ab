use std::mem;

use actson::JsonEvent;

use georocket_types::{IndexDocument, Value};

use crate::error::Result;
use crate::index::{
    ChunkIndexer, GeoJsonEvent, Indexer, IndexerFactory, JsonPayload, QueryPriority, SourceKind,
};
use crate::query::{IndexQuery, QueryPart};

/// Collects the top-level `id` member of a GeoJSON feature chunk
#[derive(Default)]
pub struct GeoJsonIdIndexer {
    depth: u32,
    expect_id: bool,
    ids: Vec<Value>,
}

impl Indexer<GeoJsonEvent> for GeoJsonIdIndexer {
    fn on_event(&mut self, event: &GeoJsonEvent) -> Result<()> {
        let (event, payload) = event;
        match event {
            JsonEvent::StartObject => {
                self.depth += 1;
                self.expect_id = false;
            }

            JsonEvent::EndObject => {
                self.depth = self.depth.saturating_sub(1);
            }

            JsonEvent::FieldName => {
                self.expect_id =
                    self.depth == 1 && matches!(payload, JsonPayload::String(s) if s == "id");
            }

            JsonEvent::ValueString if self.expect_id => {
                if let JsonPayload::String(s) = payload {
                    self.ids.push(Value::String(s.clone()));
                }
                self.expect_id = false;
            }

            JsonEvent::ValueInt if self.expect_id => {
                if let JsonPayload::Int(v) = payload {
                    self.ids.push(Value::Integer(*v));
                }
                self.expect_id = false;
            }

            _ => {
                self.expect_id = false;
            }
        }
        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.ids.is_empty() {
            doc.insert(
                "geoJsonFeatureIds".to_string(),
                Value::List(mem::take(&mut self.ids)),
            );
        }
        doc
    }
}

pub struct GeoJsonIdIndexerFactory;

impl IndexerFactory for GeoJsonIdIndexerFactory {
    fn name(&self) -> &'static str {
        "geoJsonId"
    }

    fn create_indexer(&self, kind: SourceKind) -> Option<ChunkIndexer> {
        match kind {
            SourceKind::GeoJson => {
                Some(ChunkIndexer::GeoJson(Box::new(GeoJsonIdIndexer::default())))
            }
            _ => None,
        }
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(s) => {
                Some(IndexQuery::contains("geoJsonFeatureIds", s.value.clone()))
            }
            _ => None,
        }
    }
}
