use std::mem;
use std::str::from_utf8;

use quick_xml::events::{BytesStart, Event};

use georocket_types::{IndexDocument, Value};

use crate::error::Result;
use crate::index::{ChunkIndexer, Indexer, IndexerFactory, QueryPriority, SourceKind};
use crate::query::{ComparisonOperator, IndexQuery, QueryPart};

/// Collects the `gml:id` attributes of all elements in a chunk
#[derive(Default)]
pub struct GmlIdIndexer {
    ids: Vec<Value>,
}

impl GmlIdIndexer {
    fn collect(&mut self, tag: &BytesStart) {
        let id = tag
            .attributes()
            .with_checks(false)
            .flatten()
            .find(|a| a.key.as_ref() == b"gml:id")
            .and_then(|a| from_utf8(&a.value).ok().map(str::to_string));
        if let Some(id) = id {
            self.ids.push(Value::String(id));
        }
    }
}

impl<'a> Indexer<Event<'a>> for GmlIdIndexer {
    fn on_event(&mut self, event: &Event<'a>) -> Result<()> {
        match event {
            Event::Start(s) => self.collect(s),
            Event::Empty(s) => self.collect(s),
            _ => {}
        }
        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.ids.is_empty() {
            doc.insert("gmlIds".to_string(), Value::List(mem::take(&mut self.ids)));
        }
        doc
    }
}

pub struct GmlIdIndexerFactory;

impl IndexerFactory for GmlIdIndexerFactory {
    fn name(&self) -> &'static str {
        "gmlId"
    }

    fn create_indexer(&self, kind: SourceKind) -> Option<ChunkIndexer> {
        match kind {
            SourceKind::Xml => Some(ChunkIndexer::Xml(Box::new(GmlIdIndexer::default()))),
            _ => None,
        }
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            QueryPart::KeyValue(kv) if kv.key == "gmlId" && kv.op == ComparisonOperator::Eq => {
                QueryPriority::Should
            }
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(s) => Some(IndexQuery::contains("gmlIds", s.value.clone())),
            QueryPart::KeyValue(kv) if kv.key == "gmlId" => {
                Some(IndexQuery::Contains {
                    field: "gmlIds".to_string(),
                    value: kv.value.clone(),
                })
            }
            _ => None,
        }
    }
}
