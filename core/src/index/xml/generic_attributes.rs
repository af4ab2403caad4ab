use std::collections::HashMap;
use std::mem;
use std::str::from_utf8;

use quick_xml::events::{attributes::Attribute, BytesStart, Event};

use georocket_types::{IndexDocument, Value};

use crate::error::Result;
use crate::index::geo_json::PropertiesIndexer;
use crate::index::{ChunkIndexer, Indexer, IndexerFactory, QueryPriority, SourceKind};
use crate::query::{IndexQuery, QueryPart};

/// Indexer for CityGML generic attributes. Collects the `name`/`value`
/// pairs of `gen:*Attribute` elements into the `genAttrs` field.
#[derive(Default)]
pub struct GenericAttributeIndexer {
    /// The key of the currently parsed generic attribute
    current_key: Option<String>,

    /// `true` if we're currently parsing a value of a generic attribute
    parsing_value: bool,

    /// A map collecting all attributes parsed
    result: HashMap<String, Value>,
}

impl GenericAttributeIndexer {
    fn get_attribute_by_local_name<'a>(
        start_tag: &'a BytesStart,
        name: &[u8],
    ) -> Option<Attribute<'a>> {
        start_tag
            .attributes()
            .with_checks(false)
            .flatten()
            .find(|a| a.key.local_name().as_ref() == name)
    }

    fn is_attribute_supported(local_name: &[u8]) -> bool {
        local_name == b"stringAttribute"
            || local_name == b"intAttribute"
            || local_name == b"doubleAttribute"
            || local_name == b"dateAttribute"
            || local_name == b"uriAttribute"
            || local_name == b"measureAttribute"
    }

    fn put(&mut self, key: String, value: &str) {
        // never overwrite attributes already collected!
        self.result
            .entry(key)
            .or_insert_with(|| Value::parse_lenient(value));
    }
}

impl<'a> Indexer<Event<'a>> for GenericAttributeIndexer {
    fn on_event(&mut self, event: &Event<'a>) -> Result<()> {
        match event {
            Event::Start(s) => {
                let local_name = s.local_name();
                if Self::is_attribute_supported(local_name.as_ref()) {
                    self.current_key = Self::get_attribute_by_local_name(s, b"name")
                        .and_then(|n| from_utf8(&n.value).ok().map(str::to_string));
                } else if local_name.as_ref() == b"value" {
                    self.parsing_value = true;
                }
            }

            Event::End(e) => {
                let local_name = e.local_name();
                if Self::is_attribute_supported(local_name.as_ref()) {
                    self.current_key = None;
                } else if local_name.as_ref() == b"value" {
                    self.parsing_value = false;
                }
            }

            Event::Text(t) => {
                if self.parsing_value {
                    if let (Some(key), Ok(v)) = (self.current_key.take(), t.unescape()) {
                        self.put(key, &v);
                    }
                }
            }

            Event::CData(d) => {
                if self.parsing_value {
                    if let (Some(key), Ok(v)) = (self.current_key.take(), from_utf8(d)) {
                        self.put(key, v);
                    }
                }
            }

            _ => {}
        }

        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.result.is_empty() {
            doc.insert(
                "genAttrs".to_string(),
                Value::Object(mem::take(&mut self.result)),
            );
        }
        doc
    }
}

/// Creates generic-attribute indexers: `gen:*` attributes for XML chunks,
/// `properties` members for GeoJSON chunks. Both feed the same `genAttrs`
/// field, so one factory compiles the queries for both.
pub struct GenericAttributeIndexerFactory;

impl IndexerFactory for GenericAttributeIndexerFactory {
    fn name(&self) -> &'static str {
        "genericAttributes"
    }

    fn create_indexer(&self, kind: SourceKind) -> Option<ChunkIndexer> {
        match kind {
            SourceKind::Xml => Some(ChunkIndexer::Xml(Box::new(
                GenericAttributeIndexer::default(),
            ))),
            SourceKind::GeoJson => {
                Some(ChunkIndexer::GeoJson(Box::new(PropertiesIndexer::default())))
            }
        }
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::KeyValue(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::KeyValue(kv) => Some(IndexQuery::Compare {
                field: format!("genAttrs.{}", kv.key),
                value: kv.value.clone(),
                op: kv.op,
            }),
            _ => None,
        }
    }
}
