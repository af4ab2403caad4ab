use std::sync::Arc;

use futures::TryStreamExt;
use tracing::debug;

use georocket_types::{ChunkMeta, IndexMeta};

use crate::error::Result;
use crate::index::{Index, IndexEntry, IndexerRegistry};
use crate::query::IndexQuery;
use crate::store::Store;

/// Couples a [`Store`] and an [`Index`] for the operations that have to
/// touch both: indexing freshly stored chunks and deleting by query.
pub struct IndexCoordinator {
    store: Arc<dyn Store>,
    index: Arc<dyn Index>,
    registry: Arc<IndexerRegistry>,
}

impl IndexCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn Index>,
        registry: Arc<IndexerRegistry>,
    ) -> Self {
        Self {
            store,
            index,
            registry,
        }
    }

    pub fn registry(&self) -> &IndexerRegistry {
        &self.registry
    }

    /// Index a batch of freshly stored chunks. The batch's order is
    /// preserved all the way into the index.
    pub async fn add_batch(
        &self,
        batch: Vec<(String, ChunkMeta)>,
        index_meta: &IndexMeta,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(batch.len());
        for (path, chunk_meta) in batch {
            let bytes = self.store.get_one(&path).await?;
            let (path, doc) = self
                .registry
                .index_chunk(&path, &bytes, &chunk_meta, index_meta)?;
            entries.push(IndexEntry {
                path,
                chunk_meta,
                doc,
            });
        }

        debug!(entries = entries.len(), "flushing index batch");
        self.index.add_many(entries).await
    }

    /// Delete all chunks matching a query from both the store and the
    /// index. Returns the number of deleted chunks.
    pub async fn delete_by_query(&self, query: &IndexQuery) -> Result<usize> {
        let paths: Vec<String> = self.index.get_paths(query).try_collect().await?;
        self.store.delete(&paths).await?;
        self.index.delete_paths(&paths).await?;
        debug!(chunks = paths.len(), "deleted by query");
        Ok(paths.len())
    }
}
