use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use georocket_types::{ChunkMeta, IndexMeta};

use crate::error::Result;

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// A blob store for chunks. Paths are assigned by the store and stable for
/// the chunk's lifetime. Implementations must be safe for concurrent calls
/// from multiple pipelines.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a chunk and return its assigned path
    async fn add(
        &self,
        chunk: &[u8],
        chunk_meta: &ChunkMeta,
        index_meta: &IndexMeta,
        layer: &str,
    ) -> Result<String>;

    async fn get_one(&self, path: &str) -> Result<Vec<u8>>;

    /// Fetch many chunks with bounded parallelism. The output preserves the
    /// order of the input stream.
    fn get_many_parallel<'a>(
        &'a self,
        paths: BoxStream<'a, String>,
        parallelism: usize,
    ) -> BoxStream<'a, Result<(String, Vec<u8>)>> {
        paths
            .map(move |path| async move {
                let bytes = self.get_one(&path).await?;
                Ok((path, bytes))
            })
            .buffered(parallelism)
            .boxed()
    }

    /// Remove chunks. Unknown paths are silent successes, so deleting the
    /// same batch twice is harmless.
    async fn delete(&self, paths: &[String]) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Normalize a layer into a path prefix. The root layer maps to the empty
/// prefix.
pub(crate) fn layer_prefix(layer: &str) -> String {
    let trimmed = layer.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt, TryStreamExt};

    use georocket_types::{GeoJsonChunkMeta, GeoJsonType, IndexMeta};

    use super::{layer_prefix, MemoryStore, Store};

    #[test]
    fn layer_prefixes() {
        assert_eq!(layer_prefix(""), "");
        assert_eq!(layer_prefix("/"), "");
        assert_eq!(layer_prefix("berlin"), "berlin/");
        assert_eq!(layer_prefix("/berlin/lod2/"), "berlin/lod2/");
    }

    /// The default parallel fetch must preserve the order of the requested
    /// paths
    #[tokio::test]
    async fn get_many_parallel_preserves_order() {
        let store = MemoryStore::new();
        let meta = GeoJsonChunkMeta::new(GeoJsonType::Feature, None).into();
        let index_meta = IndexMeta::new("c", 0);

        let mut paths = Vec::new();
        for i in 0..20u8 {
            paths.push(store.add(&[i], &meta, &index_meta, "").await.unwrap());
        }

        let fetched: Vec<_> = store
            .get_many_parallel(stream::iter(paths.clone()).boxed(), 4)
            .try_collect()
            .await
            .unwrap();

        let fetched_paths: Vec<_> = fetched.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(fetched_paths, paths);
        for (i, (_, bytes)) in fetched.iter().enumerate() {
            assert_eq!(bytes, &vec![i as u8]);
        }
    }
}
