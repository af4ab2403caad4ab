use std::mem;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

use georocket_types::{ChunkMeta, IndexMeta};

use crate::coordinator::IndexCoordinator;
use crate::error::{Error, Result};
use crate::index::SourceKind;
use crate::input::{FirstLevelSplitter, GeoJsonSplitter, SplitterResult};
use crate::store::Store;

pub const DEFAULT_MAX_BULK_SIZE: usize = 200;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    /// Number of chunks imported
    pub chunks: usize,

    /// Total elapsed wall-clock time in milliseconds
    pub millis: u128,
}

/// Drives one import: splits the input into chunks, stores them in source
/// order and feeds them through the indexers in batches. Batches flush when
/// they reach `max_bulk_size` or when the debounce timer fires after the
/// last chunk of a burst.
pub struct Importer {
    store: Arc<dyn Store>,
    coordinator: Arc<IndexCoordinator>,
    max_bulk_size: usize,
    debounce: Duration,
    channel_capacity: usize,
}

impl Importer {
    pub fn new(store: Arc<dyn Store>, coordinator: Arc<IndexCoordinator>) -> Self {
        Self {
            store,
            coordinator,
            max_bulk_size: DEFAULT_MAX_BULK_SIZE,
            debounce: DEFAULT_DEBOUNCE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_max_bulk_size(mut self, max_bulk_size: usize) -> Self {
        self.max_bulk_size = max_bulk_size.max(1);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Import a stream of the given mime type into the given layer
    pub async fn import<R>(
        &self,
        reader: R,
        mime_type: &str,
        index_meta: IndexMeta,
        layer: &str,
    ) -> Result<ImportReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.import_cancellable(reader, mime_type, index_meta, layer, cancel_rx)
            .await
    }

    /// Like [`import`](Self::import), but stops at the next suspension
    /// point once `cancel` flips to `true`. Chunks already handed to the
    /// store are still indexed before the import returns
    /// [`Error::Cancelled`]; committed chunks are not rolled back.
    pub async fn import_cancellable<R>(
        &self,
        reader: R,
        mime_type: &str,
        index_meta: IndexMeta,
        layer: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ImportReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let started = Instant::now();

        // fail before anything is stored
        let kind = SourceKind::from_mime_type(mime_type)?;

        let (chunks_tx, chunks_rx) = async_channel::bounded(self.channel_capacity);
        let splitter = match kind {
            SourceKind::Xml => tokio::spawn(FirstLevelSplitter::new(reader, chunks_tx).run()),
            SourceKind::GeoJson => tokio::spawn(GeoJsonSplitter::new(reader, chunks_tx).run()),
        };

        match self.drive(&chunks_rx, &index_meta, layer, &mut cancel).await {
            Ok(chunks) => {
                match splitter.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(e),
                    Err(e) => return Err(Error::Upstream(e.into())),
                }
                let report = ImportReport {
                    chunks,
                    millis: started.elapsed().as_millis(),
                };
                info!(
                    chunks = report.chunks,
                    millis = report.millis as u64,
                    layer,
                    "import finished"
                );
                Ok(report)
            }
            Err(e) => {
                splitter.abort();
                let _ = splitter.await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        chunks_rx: &Receiver<SplitterResult>,
        index_meta: &IndexMeta,
        layer: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<usize> {
        let mut pending: Vec<(String, ChunkMeta)> = Vec::new();
        let mut deadline: Option<Instant> = None;
        let mut total = 0usize;

        loop {
            tokio::select! {
                biased;

                _ = cancelled(cancel) => {
                    // chunks already stored must still reach the index
                    let _ = self
                        .coordinator
                        .add_batch(mem::take(&mut pending), index_meta)
                        .await;
                    return Err(Error::Cancelled);
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.coordinator
                        .add_batch(mem::take(&mut pending), index_meta)
                        .await?;
                    deadline = None;
                }

                chunk = chunks_rx.recv() => match chunk {
                    Ok(SplitterResult { chunk, meta }) => {
                        let path = self.store.add(&chunk, &meta, index_meta, layer).await?;
                        total += 1;
                        pending.push((path, meta));

                        if pending.len() >= self.max_bulk_size {
                            self.coordinator
                                .add_batch(mem::take(&mut pending), index_meta)
                                .await?;
                            deadline = None;
                        } else {
                            // trailing-edge debounce
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }

                    // the channel closes when the splitter is done
                    Err(_) => break,
                }
            }
        }

        self.coordinator
            .add_batch(mem::take(&mut pending), index_meta)
            .await?;
        Ok(total)
    }
}

/// Resolves once the cancel flag flips to `true`; pends forever if the
/// sender is gone (the import then simply runs to completion)
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
