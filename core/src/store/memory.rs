use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use ulid::Generator;

use georocket_types::{ChunkMeta, IndexMeta};

use crate::error::{Error, Result};

use super::{layer_prefix, Store};

/// An in-process chunk store. Paths are monotonic ULIDs so that path order
/// equals insertion order.
pub struct MemoryStore {
    chunks: RwLock<HashMap<String, Vec<u8>>>,
    ids: Mutex<Generator>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            ids: Mutex::new(Generator::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_path(&self, layer: &str) -> Result<String> {
        let id = self
            .ids
            .lock()
            .generate()
            .map_err(|e| Error::Upstream(anyhow!(e)))?;
        Ok(format!("{}{}", layer_prefix(layer), id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add(
        &self,
        chunk: &[u8],
        _chunk_meta: &ChunkMeta,
        _index_meta: &IndexMeta,
        layer: &str,
    ) -> Result<String> {
        let path = self.next_path(layer)?;
        self.chunks.write().insert(path.clone(), chunk.to_vec());
        Ok(path)
    }

    async fn get_one(&self, path: &str) -> Result<Vec<u8>> {
        self.chunks
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Upstream(anyhow!("no chunk at path `{path}'")))
    }

    async fn delete(&self, paths: &[String]) -> Result<()> {
        let mut chunks = self.chunks.write();
        for path in paths {
            chunks.remove(path);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
