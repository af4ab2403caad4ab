use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use georocket_types::{ChunkMeta, IndexDocument};

use crate::error::{Error, Result};
use crate::query::IndexQuery;

use super::{Index, IndexEntry, MemoryIndex};

/// One line of the journal file
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JournalRecord {
    path: String,
    chunk_meta: ChunkMeta,
    doc: IndexDocument,
}

impl From<&IndexEntry> for JournalRecord {
    fn from(e: &IndexEntry) -> Self {
        Self {
            path: e.path.clone(),
            chunk_meta: e.chunk_meta.clone(),
            doc: e.doc.clone(),
        }
    }
}

impl From<JournalRecord> for IndexEntry {
    fn from(r: JournalRecord) -> Self {
        Self {
            path: r.path,
            chunk_meta: r.chunk_meta,
            doc: r.doc,
        }
    }
}

/// A filesystem-backed index: a JSON-lines journal that is loaded into a
/// [`MemoryIndex`] on open, appended to on `add_many` and rewritten by
/// destructive operations. Queries run against the in-memory state.
pub struct FsIndex {
    inner: MemoryIndex,
    journal_path: PathBuf,
    journal: Mutex<File>,
}

impl FsIndex {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let journal_path = path.into();
        if let Some(parent) = journal_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let inner = MemoryIndex::new();
        if tokio::fs::try_exists(&journal_path).await? {
            let file = File::open(&journal_path).await?;
            let mut lines = BufReader::new(file).lines();
            let mut entries = Vec::new();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                let record: JournalRecord =
                    serde_json::from_str(&line).map_err(|e| Error::Upstream(e.into()))?;
                entries.push(record.into());
            }
            debug!(entries = entries.len(), path = %journal_path.display(), "loaded index journal");
            inner.add_many(entries).await?;
        }

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await?;

        Ok(Self {
            inner,
            journal_path,
            journal: Mutex::new(journal),
        })
    }

    async fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut file = self.journal.lock().await;
        for entry in entries {
            let mut line = serde_json::to_string(&JournalRecord::from(entry))
                .map_err(|e| Error::Upstream(e.into()))?;
            line.push('\n');
            file.write_all(line.as_bytes()).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Replace the journal with the current in-memory state
    async fn rewrite(&self) -> Result<()> {
        let entries = self.inner.dump();
        let mut file = self.journal.lock().await;
        let mut fresh = File::create(&self.journal_path).await?;
        for entry in &entries {
            let mut line = serde_json::to_string(&JournalRecord::from(entry))
                .map_err(|e| Error::Upstream(e.into()))?;
            line.push('\n');
            fresh.write_all(line.as_bytes()).await?;
        }
        fresh.flush().await?;
        *file = fresh;
        Ok(())
    }
}

#[async_trait]
impl Index for FsIndex {
    async fn add_many(&self, entries: Vec<IndexEntry>) -> Result<()> {
        self.append(&entries).await?;
        self.inner.add_many(entries).await
    }

    fn get_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<(String, ChunkMeta)>> {
        self.inner.get_meta(query)
    }

    fn get_distinct_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<ChunkMeta>> {
        self.inner.get_distinct_meta(query)
    }

    fn get_paths<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<String>> {
        self.inner.get_paths(query)
    }

    async fn delete_by_query(&self, query: &IndexQuery) -> Result<()> {
        self.inner.delete_by_query(query).await?;
        self.rewrite().await
    }

    async fn delete_paths(&self, paths: &[String]) -> Result<()> {
        self.inner.delete_paths(paths).await?;
        self.rewrite().await
    }

    async fn add_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()> {
        self.inner.add_tags(query, tags).await?;
        self.rewrite().await
    }

    async fn remove_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()> {
        self.inner.remove_tags(query, tags).await?;
        self.rewrite().await
    }

    async fn set_properties(
        &self,
        query: &IndexQuery,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        self.inner.set_properties(query, properties).await?;
        self.rewrite().await
    }

    async fn remove_properties(&self, query: &IndexQuery, keys: &[String]) -> Result<()> {
        self.inner.remove_properties(query, keys).await?;
        self.rewrite().await
    }

    fn get_property_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>> {
        self.inner.get_property_values(query, key)
    }

    fn get_attribute_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>> {
        self.inner.get_attribute_values(query, key)
    }

    fn get_collections(&self) -> BoxStream<'_, Result<String>> {
        self.inner.get_collections()
    }

    async fn add_collection(&self, name: &str) -> Result<()> {
        self.inner.add_collection(name).await
    }

    async fn exists_collection(&self, name: &str) -> Result<bool> {
        self.inner.exists_collection(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }
}
