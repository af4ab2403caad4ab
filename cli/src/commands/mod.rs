use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use georocket_core::coordinator::IndexCoordinator;
use georocket_core::index::{FsIndex, IndexerRegistry};
use georocket_core::store::FsStore;

pub mod delete;
pub mod import;
pub mod search;

/// The filesystem-backed store and index all commands operate on
pub struct Backend {
    pub store: Arc<FsStore>,
    pub index: Arc<FsIndex>,
    pub registry: Arc<IndexerRegistry>,
}

impl Backend {
    pub async fn open(root: &Path) -> Result<Self> {
        let store = Arc::new(FsStore::new(root.join("chunks")).await?);
        let index = Arc::new(FsIndex::open(root.join("index.jsonl")).await?);
        let registry = Arc::new(IndexerRegistry::with_defaults());
        Ok(Self {
            store,
            index,
            registry,
        })
    }

    pub fn coordinator(&self) -> Arc<IndexCoordinator> {
        Arc::new(IndexCoordinator::new(
            self.store.clone(),
            self.index.clone(),
            self.registry.clone(),
        ))
    }
}
