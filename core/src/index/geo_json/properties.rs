use std::collections::HashMap;
use std::mem;

use actson::JsonEvent;

use georocket_types::{IndexDocument, Value};

use crate::error::Result;
use crate::index::{GeoJsonEvent, Indexer, JsonPayload};

/// Collects the scalar members of a feature's top-level `properties` object
/// into the `genAttrs` field. Nested objects and arrays are skipped.
#[derive(Default)]
pub struct PropertiesIndexer {
    /// Object nesting level within the chunk
    depth: u32,

    /// `true` right after a top-level `properties` field name was seen
    expect_properties: bool,

    /// Object depth at which the `properties` object lives, if inside one
    properties_depth: Option<u32>,

    current_key: Option<String>,
    attributes: HashMap<String, Value>,
}

impl PropertiesIndexer {
    fn in_properties(&self) -> bool {
        self.properties_depth == Some(self.depth)
    }

    fn put(&mut self, value: Value) {
        if let Some(key) = self.current_key.take() {
            self.attributes.entry(key).or_insert(value);
        }
    }
}

impl Indexer<GeoJsonEvent> for PropertiesIndexer {
    fn on_event(&mut self, event: &GeoJsonEvent) -> Result<()> {
        let (event, payload) = event;
        match event {
            JsonEvent::StartObject => {
                self.depth += 1;
                self.current_key = None;
                if self.expect_properties {
                    self.expect_properties = false;
                    self.properties_depth = Some(self.depth);
                }
            }

            JsonEvent::EndObject => {
                if self.in_properties() {
                    self.properties_depth = None;
                }
                self.depth = self.depth.saturating_sub(1);
            }

            JsonEvent::FieldName => {
                self.expect_properties =
                    self.depth == 1 && matches!(payload, JsonPayload::String(s) if s == "properties");
                if self.in_properties() {
                    if let JsonPayload::String(s) = payload {
                        self.current_key = Some(s.clone());
                    }
                }
            }

            JsonEvent::ValueString if self.in_properties() => {
                if let JsonPayload::String(s) = payload {
                    self.put(Value::String(s.clone()));
                }
            }

            JsonEvent::ValueInt if self.in_properties() => {
                if let JsonPayload::Int(v) = payload {
                    self.put(Value::Integer(*v));
                }
            }

            JsonEvent::ValueFloat if self.in_properties() => {
                if let JsonPayload::Double(v) = payload {
                    self.put(Value::Float(*v));
                }
            }

            JsonEvent::ValueTrue if self.in_properties() => self.put(Value::Bool(true)),

            JsonEvent::ValueFalse if self.in_properties() => self.put(Value::Bool(false)),

            _ => {
                self.expect_properties = false;
                self.current_key = None;
            }
        }
        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.attributes.is_empty() {
            doc.insert(
                "genAttrs".to_string(),
                Value::Object(mem::take(&mut self.attributes)),
            );
        }
        doc
    }
}
