use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use georocket_types::{ChunkMeta, GeoJsonChunkMeta, GeoJsonType};

use crate::error::{Error, Result};

use super::{write_all, MergeSink, Merger};

/// Merges GeoJSON chunks back into one document. A single chunk is written
/// bare; two or more chunks are wrapped into a `FeatureCollection` (when
/// the first chunk is a feature or came from a `features` array) or a
/// `GeometryCollection` otherwise. Unknown chunk types are embedded as-is.
#[derive(Default)]
pub struct GeoJsonMerger {
    /// The first chunk and its metadata are buffered until we know whether
    /// the chunk stays bare
    first: Option<(Vec<u8>, GeoJsonChunkMeta)>,
    chunks: usize,
}

impl GeoJsonMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_feature(meta: &GeoJsonChunkMeta) -> bool {
    meta.kind == GeoJsonType::Feature || meta.parent_field_name.as_deref() == Some("features")
}

fn collection_header(first: &GeoJsonChunkMeta, second: &GeoJsonChunkMeta) -> &'static [u8] {
    if is_feature(first) || is_feature(second) {
        b"{\"type\":\"FeatureCollection\",\"features\":["
    } else {
        b"{\"type\":\"GeometryCollection\",\"geometries\":["
    }
}

#[async_trait]
impl Merger for GeoJsonMerger {
    async fn merge(&mut self, chunk: &[u8], meta: &ChunkMeta, out: &mut MergeSink) -> Result<()> {
        let meta = match meta {
            ChunkMeta::GeoJson(m) => m,
            _ => {
                return Err(Error::UnsupportedMimeType {
                    mime: meta.mime_type().to_string(),
                })
            }
        };

        self.chunks += 1;
        match self.chunks {
            1 => self.first = Some((chunk.to_vec(), meta.clone())),
            2 => {
                if let Some((first, first_meta)) = self.first.take() {
                    write_all(out, collection_header(&first_meta, meta)).await?;
                    write_all(out, &first).await?;
                }
                write_all(out, b",").await?;
                write_all(out, chunk).await?;
            }
            _ => {
                write_all(out, b",").await?;
                write_all(out, chunk).await?;
            }
        }

        Ok(())
    }

    async fn finish(&mut self, out: &mut MergeSink) -> Result<()> {
        match self.chunks {
            0 => {}
            1 => {
                // a single chunk is written as the bare object
                if let Some((first, _)) = self.first.take() {
                    write_all(out, &first).await?;
                }
            }
            _ => write_all(out, b"]}").await?,
        }
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use georocket_types::{ChunkMeta, GeoJsonChunkMeta, GeoJsonType};

    use crate::output::Merger;

    use super::GeoJsonMerger;

    fn meta(kind: GeoJsonType, parent: Option<&str>) -> ChunkMeta {
        ChunkMeta::GeoJson(GeoJsonChunkMeta::new(kind, parent.map(str::to_string)))
    }

    async fn merge_all(chunks: &[(&str, ChunkMeta)]) -> String {
        let mut out = Cursor::new(Vec::new());
        let mut merger = GeoJsonMerger::new();
        for (chunk, m) in chunks {
            merger.merge(chunk.as_bytes(), m, &mut out).await.unwrap();
        }
        merger.finish(&mut out).await.unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn single_chunk_stays_bare() {
        let chunk = r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}}"#;
        let s = merge_all(&[(chunk, meta(GeoJsonType::Feature, None))]).await;
        assert_eq!(s, chunk);
    }

    #[tokio::test]
    async fn features_become_a_feature_collection() {
        let c1 = r#"{"type":"Feature","properties":{"n":1}}"#;
        let c2 = r#"{"type":"Feature","properties":{"n":2}}"#;
        let s = merge_all(&[
            (c1, meta(GeoJsonType::Feature, Some("features"))),
            (c2, meta(GeoJsonType::Feature, Some("features"))),
        ])
        .await;
        assert_eq!(
            s,
            format!(r#"{{"type":"FeatureCollection","features":[{c1},{c2}]}}"#)
        );
    }

    #[tokio::test]
    async fn geometries_become_a_geometry_collection() {
        let c1 = r#"{"type":"Point","coordinates":[1,2]}"#;
        let c2 = r#"{"type":"Point","coordinates":[3,4]}"#;
        let s = merge_all(&[
            (c1, meta(GeoJsonType::Point, Some("geometries"))),
            (c2, meta(GeoJsonType::Point, Some("geometries"))),
        ])
        .await;
        assert_eq!(
            s,
            format!(r#"{{"type":"GeometryCollection","geometries":[{c1},{c2}]}}"#)
        );
    }

    #[tokio::test]
    async fn unknown_chunks_are_embedded_as_is() {
        let c1 = r#"{"type":"Feature","properties":{}}"#;
        let c2 = r#"{"custom":true}"#;
        let s = merge_all(&[
            (c1, meta(GeoJsonType::Feature, Some("features"))),
            (c2, meta(GeoJsonType::Unknown, Some("features"))),
        ])
        .await;
        assert_eq!(
            s,
            format!(r#"{{"type":"FeatureCollection","features":[{c1},{c2}]}}"#)
        );
    }

    #[tokio::test]
    async fn no_chunks_no_output() {
        let s = merge_all(&[]).await;
        assert_eq!(s, "");
    }
}
