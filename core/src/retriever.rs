use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::TryStreamExt;
use tracing::debug;

use georocket_types::ChunkMeta;

use crate::error::Result;
use crate::index::{Index, IndexerRegistry};
use crate::output::{GeoJsonMerger, MergeSink, Merger, XmlMerger};
use crate::query::{compile, IndexQuery};
use crate::store::Store;

pub const DEFAULT_FETCH_PARALLELISM: usize = 32;

/// Answers search queries: compiles the query, resolves matching chunks
/// through the index, fetches their bytes with bounded parallelism and
/// streams the merged document into a byte sink.
pub struct Retriever {
    store: Arc<dyn Store>,
    index: Arc<dyn Index>,
    registry: Arc<IndexerRegistry>,
    parallelism: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn Index>,
        registry: Arc<IndexerRegistry>,
    ) -> Self {
        Self {
            store,
            index,
            registry,
            parallelism: DEFAULT_FETCH_PARALLELISM,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Compile and run a query, merging all matching chunks into `out`.
    /// Returns the number of merged chunks.
    pub async fn search(&self, query: &str, out: &mut MergeSink) -> Result<usize> {
        let compiled = compile(query, self.registry.factories())?;
        self.retrieve(&compiled, out).await
    }

    /// Run an already compiled query
    pub async fn retrieve(&self, query: &IndexQuery, out: &mut MergeSink) -> Result<usize> {
        let mut metas: Vec<(String, ChunkMeta)> =
            self.index.get_meta(query).try_collect().await?;

        // the merged document must follow the original import order; sort
        // by path because index backends do not have to guarantee order
        metas.sort_by(|a, b| a.0.cmp(&b.0));

        if metas.is_empty() {
            return Ok(0);
        }

        let mut merger: Box<dyn Merger> = match metas[0].1 {
            ChunkMeta::Xml(_) => Box::new(XmlMerger::new()),
            ChunkMeta::GeoJson(_) => Box::new(GeoJsonMerger::new()),
        };

        let paths: Vec<String> = metas.iter().map(|(p, _)| p.clone()).collect();
        let mut chunks = self
            .store
            .get_many_parallel(stream::iter(paths).boxed(), self.parallelism);

        let mut merged = 0;
        let mut metas = metas.into_iter();
        while let Some(fetched) = chunks.next().await {
            let (path, bytes) = fetched?;
            // get_many_parallel preserves order, so the metadata lines up
            let Some((_, meta)) = metas.next() else {
                break;
            };
            merger.merge(&bytes, &meta, out).await?;
            merged += 1;
            debug!(path, "merged chunk");
        }

        merger.finish(out).await?;
        Ok(merged)
    }
}
