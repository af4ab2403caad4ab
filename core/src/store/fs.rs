use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use ulid::Generator;

use georocket_types::{ChunkMeta, IndexMeta};

use crate::error::{Error, Result};

use super::{layer_prefix, Store};

/// A chunk store writing one file per chunk below a root directory. The
/// layer becomes a directory hierarchy; file names are monotonic ULIDs so
/// path order equals import order.
pub struct FsStore {
    root: PathBuf,
    ids: Mutex<Generator>,
}

impl FsStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            ids: Mutex::new(Generator::new()),
        })
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
impl Store for FsStore {
    async fn add(
        &self,
        chunk: &[u8],
        _chunk_meta: &ChunkMeta,
        _index_meta: &IndexMeta,
        layer: &str,
    ) -> Result<String> {
        let path = self.next_path(layer)?;
        let file = self.root.join(&path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, chunk).await?;
        debug!(path, bytes = chunk.len(), "stored chunk");
        Ok(path)
    }

    async fn get_one(&self, path: &str) -> Result<Vec<u8>> {
        match tokio::fs::read(self.root.join(path)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::Upstream(anyhow!("no chunk at path `{path}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            match tokio::fs::remove_file(self.root.join(path)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use georocket_types::{GeoJsonChunkMeta, GeoJsonType, IndexMeta};

    use crate::store::Store;

    use super::FsStore;

    #[tokio::test]
    async fn add_get_delete() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path()).await.unwrap();
        let meta = GeoJsonChunkMeta::new(GeoJsonType::Feature, None).into();
        let index_meta = IndexMeta::new("c", 0);

        let path = store
            .add(b"data", &meta, &index_meta, "berlin/lod2")
            .await
            .unwrap();
        assert!(path.starts_with("berlin/lod2/"));
        assert!(dir.path().join(&path).is_file());
        assert_eq!(store.get_one(&path).await.unwrap(), b"data");

        store.delete(&[path.clone()]).await.unwrap();
        assert!(store.get_one(&path).await.is_err());

        // deleting again is a silent success
        store.delete(&[path]).await.unwrap();
    }
}
