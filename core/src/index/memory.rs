use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use georocket_types::{BoundingBox, ChunkMeta, IndexDocument, Value};

use crate::error::{Error, Result};
use crate::query::{ComparisonOperator, IndexQuery};
use crate::util::single_flight::SingleFlight;

use super::{Index, IndexEntry};

struct Entry {
    meta_id: usize,
    doc: IndexDocument,
}

#[derive(Default)]
struct State {
    /// Index documents by path. Ordered so results come back in path
    /// (i.e. import) order.
    entries: BTreeMap<String, Entry>,

    /// Deduplicated chunk metadata, referenced by id
    metas: Vec<ChunkMeta>,

    collections: BTreeSet<String>,
}

/// An in-process index backend. It evaluates the compiled predicate tree
/// directly against the stored index documents and is safe for concurrent
/// use from multiple pipelines.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,

    /// Single-flight cache mapping serialized chunk metadata to its id, so
    /// concurrent imports sharing a meta store it exactly once
    meta_ids: SingleFlight<String, usize>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries currently in the index, in path order. Used by
    /// journaling backends to persist their state.
    pub fn dump(&self) -> Vec<IndexEntry> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .map(|(path, e)| IndexEntry {
                path: path.clone(),
                chunk_meta: state.metas[e.meta_id].clone(),
                doc: e.doc.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Index for MemoryIndex {
    async fn add_many(&self, entries: Vec<IndexEntry>) -> Result<()> {
        for entry in entries {
            let key = serde_json::to_string(&entry.chunk_meta)
                .map_err(|e| Error::Upstream(e.into()))?;
            let meta = entry.chunk_meta;
            let meta_id = self
                .meta_ids
                .get_or_compute(key, || async {
                    let mut state = self.state.write();
                    state.metas.push(meta);
                    Ok::<_, Error>(state.metas.len() - 1)
                })
                .await?;

            self.state.write().entries.insert(
                entry.path,
                Entry {
                    meta_id,
                    doc: entry.doc,
                },
            );
        }
        Ok(())
    }

    fn get_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<(String, ChunkMeta)>> {
        let state = self.state.read();
        let results: Vec<_> = state
            .entries
            .iter()
            .filter(|(_, e)| document_matches(&e.doc, query))
            .map(|(path, e)| Ok((path.clone(), state.metas[e.meta_id].clone())))
            .collect();
        stream::iter(results).boxed()
    }

    fn get_distinct_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<ChunkMeta>> {
        let state = self.state.read();
        let ids: BTreeSet<usize> = state
            .entries
            .values()
            .filter(|e| document_matches(&e.doc, query))
            .map(|e| e.meta_id)
            .collect();
        let results: Vec<_> = ids.into_iter().map(|id| Ok(state.metas[id].clone())).collect();
        stream::iter(results).boxed()
    }

    fn get_paths<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<String>> {
        let state = self.state.read();
        let results: Vec<_> = state
            .entries
            .iter()
            .filter(|(_, e)| document_matches(&e.doc, query))
            .map(|(path, _)| Ok(path.clone()))
            .collect();
        stream::iter(results).boxed()
    }

    async fn delete_by_query(&self, query: &IndexQuery) -> Result<()> {
        self.state
            .write()
            .entries
            .retain(|_, e| !document_matches(&e.doc, query));
        Ok(())
    }

    async fn delete_paths(&self, paths: &[String]) -> Result<()> {
        let mut state = self.state.write();
        for path in paths {
            state.entries.remove(path);
        }
        Ok(())
    }

    async fn add_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()> {
        let mut state = self.state.write();
        for entry in state.entries.values_mut() {
            if !document_matches(&entry.doc, query) {
                continue;
            }
            let list = entry
                .doc
                .entry("tags".to_string())
                .or_insert_with(|| Value::List(Vec::new()));
            if let Value::List(items) = list {
                for tag in tags {
                    if !items.iter().any(|v| matches!(v, Value::String(s) if s == tag)) {
                        items.push(Value::String(tag.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    async fn remove_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()> {
        let mut state = self.state.write();
        for entry in state.entries.values_mut() {
            if !document_matches(&entry.doc, query) {
                continue;
            }
            if let Some(Value::List(items)) = entry.doc.get_mut("tags") {
                items.retain(|v| !matches!(v, Value::String(s) if tags.contains(s)));
            }
        }
        Ok(())
    }

    async fn set_properties(
        &self,
        query: &IndexQuery,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.write();
        for entry in state.entries.values_mut() {
            if !document_matches(&entry.doc, query) {
                continue;
            }
            let props = entry
                .doc
                .entry("props".to_string())
                .or_insert_with(|| Value::Object(HashMap::new()));
            if let Value::Object(map) = props {
                for (k, v) in &properties {
                    map.insert(k.clone(), Value::String(v.clone()));
                }
            }
        }
        Ok(())
    }

    async fn remove_properties(&self, query: &IndexQuery, keys: &[String]) -> Result<()> {
        let mut state = self.state.write();
        for entry in state.entries.values_mut() {
            if !document_matches(&entry.doc, query) {
                continue;
            }
            if let Some(Value::Object(map)) = entry.doc.get_mut("props") {
                for key in keys {
                    map.remove(key);
                }
            }
        }
        Ok(())
    }

    fn get_property_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>> {
        self.collect_values(query, &format!("props.{key}"))
    }

    fn get_attribute_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>> {
        self.collect_values(query, &format!("genAttrs.{key}"))
    }

    fn get_collections(&self) -> BoxStream<'_, Result<String>> {
        let names: Vec<_> = self
            .state
            .read()
            .collections
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(names).boxed()
    }

    async fn add_collection(&self, name: &str) -> Result<()> {
        self.state.write().collections.insert(name.to_string());
        Ok(())
    }

    async fn exists_collection(&self, name: &str) -> Result<bool> {
        Ok(self.state.read().collections.contains(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.state.write().collections.remove(name);
        Ok(())
    }
}

impl MemoryIndex {
    fn collect_values<'a>(
        &'a self,
        query: &IndexQuery,
        field: &str,
    ) -> BoxStream<'a, Result<String>> {
        let state = self.state.read();
        let values: BTreeSet<String> = state
            .entries
            .values()
            .filter(|e| document_matches(&e.doc, query))
            .filter_map(|e| lookup(&e.doc, field).and_then(value_to_string))
            .collect();
        stream::iter(values.into_iter().map(Ok)).boxed()
    }
}

/// Look up a dot-separated field path in an index document
fn lookup<'a>(doc: &'a IndexDocument, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((first, rest)) => doc.get(first)?.lookup(rest),
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(doc_value: &Value, query_value: &Value) -> Option<Ordering> {
    match (doc_value, query_value) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (doc_value.as_f64(), query_value.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

/// Evaluate a compiled predicate tree against one index document
pub(crate) fn document_matches(doc: &IndexDocument, query: &IndexQuery) -> bool {
    match query {
        IndexQuery::All => true,

        IndexQuery::And(qs) => qs.iter().all(|q| document_matches(doc, q)),

        IndexQuery::Or(qs) => qs.iter().any(|q| document_matches(doc, q)),

        IndexQuery::Not(q) => !document_matches(doc, q),

        IndexQuery::Compare { field, value, op } => lookup(doc, field)
            .and_then(|dv| compare_values(dv, value))
            .map_or(false, |ord| match op {
                ComparisonOperator::Eq => ord == Ordering::Equal,
                ComparisonOperator::Gt => ord == Ordering::Greater,
                ComparisonOperator::Gte => ord != Ordering::Less,
                ComparisonOperator::Lt => ord == Ordering::Less,
                ComparisonOperator::Lte => ord != Ordering::Greater,
            }),

        IndexQuery::Contains { field, value } => match lookup(doc, field) {
            Some(Value::List(items)) => items.iter().any(|v| values_equal(v, value)),
            Some(v) => values_equal(v, value),
            None => false,
        },

        IndexQuery::ElementsWithin(bbox) => doc
            .get("bbox")
            .and_then(BoundingBox::from_value)
            .map_or(false, |b| bbox.contains(&b)),

        IndexQuery::ElementsContain(bbox) => doc
            .get("bbox")
            .and_then(BoundingBox::from_value)
            .map_or(false, |b| b.contains(bbox)),
    }
}
