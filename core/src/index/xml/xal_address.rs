use std::collections::HashMap;
use std::mem;
use std::str::from_utf8;

use quick_xml::events::Event;

use georocket_types::{IndexDocument, Value};

use crate::error::Result;
use crate::index::{ChunkIndexer, Indexer, IndexerFactory, QueryPriority, SourceKind};
use crate::query::{ComparisonOperator, IndexQuery, QueryPart};

/// The address fields extracted from XAL elements, in the order they are
/// offered to the query compiler
pub const XAL_ADDRESS_KEYS: &[&str] = &[
    "Country",
    "Locality",
    "Thoroughfare",
    "ThoroughfareNumber",
    "PostalCode",
    "AdministrativeArea",
];

fn address_key(local_name: &[u8]) -> Option<&'static str> {
    match local_name {
        b"CountryName" => Some("Country"),
        b"LocalityName" => Some("Locality"),
        b"ThoroughfareName" => Some("Thoroughfare"),
        b"ThoroughfareNumber" => Some("ThoroughfareNumber"),
        b"PostalCodeNumber" => Some("PostalCode"),
        b"AdministrativeAreaName" => Some("AdministrativeArea"),
        _ => None,
    }
}

/// Extracts an address from XAL elements (as used by the CityGML `Address`
/// feature) into the `address` field
#[derive(Default)]
pub struct XalAddressIndexer {
    current_key: Option<&'static str>,
    address: HashMap<String, Value>,
}

impl XalAddressIndexer {
    fn put(&mut self, value: &str) {
        if let Some(key) = self.current_key {
            let value = value.trim();
            if !value.is_empty() {
                self.address
                    .entry(key.to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }
    }
}

impl<'a> Indexer<Event<'a>> for XalAddressIndexer {
    fn on_event(&mut self, event: &Event<'a>) -> Result<()> {
        match event {
            Event::Start(s) => {
                self.current_key = address_key(s.local_name().as_ref());
            }

            Event::End(e) => {
                if address_key(e.local_name().as_ref()).is_some() {
                    self.current_key = None;
                }
            }

            Event::Text(t) => {
                if let Ok(v) = t.unescape() {
                    self.put(&v);
                }
            }

            Event::CData(d) => {
                if let Ok(v) = from_utf8(d) {
                    self.put(v);
                }
            }

            _ => {}
        }

        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.address.is_empty() {
            doc.insert(
                "address".to_string(),
                Value::Object(mem::take(&mut self.address)),
            );
        }
        doc
    }
}

pub struct XalAddressIndexerFactory;

impl IndexerFactory for XalAddressIndexerFactory {
    fn name(&self) -> &'static str {
        "xalAddress"
    }

    fn create_indexer(&self, kind: SourceKind) -> Option<ChunkIndexer> {
        match kind {
            SourceKind::Xml => Some(ChunkIndexer::Xml(Box::new(XalAddressIndexer::default()))),
            _ => None,
        }
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            QueryPart::KeyValue(kv) if XAL_ADDRESS_KEYS.contains(&kv.key.as_str()) => {
                QueryPriority::Should
            }
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            // a free-form term may match any of the address fields
            QueryPart::String(s) => Some(IndexQuery::Or(
                XAL_ADDRESS_KEYS
                    .iter()
                    .map(|key| {
                        IndexQuery::compare(
                            format!("address.{key}"),
                            s.value.clone(),
                            ComparisonOperator::Eq,
                        )
                    })
                    .collect(),
            )),
            QueryPart::KeyValue(kv) => Some(IndexQuery::Compare {
                field: format!("address.{}", kv.key),
                value: kv.value.clone(),
                op: kv.op,
            }),
            _ => None,
        }
    }
}
