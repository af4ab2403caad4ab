//! End-to-end tests driving the whole import → index → query → merge
//! pipeline against the in-memory backends.

use std::io::Cursor;
use std::sync::Arc;

use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use georocket_core::coordinator::IndexCoordinator;
use georocket_core::error::Error;
use georocket_core::importer::Importer;
use georocket_core::index::{Index, IndexerRegistry, MemoryIndex};
use georocket_core::query::IndexQuery;
use georocket_core::retriever::Retriever;
use georocket_core::store::MemoryStore;
use georocket_types::IndexMeta;

struct Pipeline {
    index: Arc<MemoryIndex>,
    coordinator: Arc<IndexCoordinator>,
    importer: Importer,
    retriever: Retriever,
}

fn pipeline() -> Pipeline {
    pipeline_with_bulk_size(None)
}

fn pipeline_with_bulk_size(max_bulk_size: Option<usize>) -> Pipeline {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(MemoryIndex::new());
    let registry = Arc::new(IndexerRegistry::with_defaults());
    let coordinator = Arc::new(IndexCoordinator::new(
        store.clone(),
        index.clone(),
        registry.clone(),
    ));
    let mut importer = Importer::new(store.clone(), coordinator.clone());
    if let Some(n) = max_bulk_size {
        importer = importer.with_max_bulk_size(n);
    }
    let retriever = Retriever::new(store, index.clone(), registry);
    Pipeline {
        index,
        coordinator,
        importer,
        retriever,
    }
}

fn meta() -> IndexMeta {
    IndexMeta::new("test-import", 1000)
}

async fn search(p: &Pipeline, query: &str) -> String {
    let mut out = Cursor::new(Vec::new());
    p.retriever.search(query, &mut out).await.unwrap();
    String::from_utf8(out.into_inner()).unwrap()
}

/// Importing an XML document and querying everything reproduces the
/// document (modulo inter-chunk whitespace)
#[tokio::test]
async fn xml_roundtrip() {
    let input = r#"<?xml version="1.0"?><c xmlns="u:a"><f id="1"/><f id="2"/></c>"#;
    let p = pipeline();

    let report = p
        .importer
        .import(
            Cursor::new(input.to_string()),
            "application/xml",
            meta(),
            "",
        )
        .await
        .unwrap();
    assert_eq!(report.chunks, 2);

    let merged = search(&p, "").await;
    assert_eq!(
        merged,
        r#"<?xml version="1.0" encoding="UTF-8"?><c xmlns="u:a"><f id="1"/><f id="2"/></c>"#
    );
}

/// A GeoJSON feature collection round-trips to a collection with the same
/// features (deep JSON equality, key order ignored)
#[tokio::test]
async fn geo_json_roundtrip() {
    let input = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"F1","geometry":{"type":"Point","coordinates":[1,2]},"properties":{"name":"a"}},
        {"type":"Feature","id":"F2","geometry":{"type":"Point","coordinates":[8,9]},"properties":{"name":"b"}}
    ]}"#;
    let p = pipeline();

    let report = p
        .importer
        .import(
            Cursor::new(input.to_string()),
            "application/json",
            meta(),
            "",
        )
        .await
        .unwrap();
    assert_eq!(report.chunks, 2);

    let merged = search(&p, "").await;
    let merged: serde_json::Value = serde_json::from_str(&merged).unwrap();
    let original: serde_json::Value = serde_json::from_str(input).unwrap();
    assert_eq!(merged["type"], "FeatureCollection");
    assert_eq!(merged["features"], original["features"]);
}

/// A single feature comes back as the bare object
#[tokio::test]
async fn geo_json_single_feature() {
    let input =
        r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}}"#;
    let p = pipeline();

    let report = p
        .importer
        .import(
            Cursor::new(input.to_string()),
            "application/json",
            meta(),
            "",
        )
        .await
        .unwrap();
    assert_eq!(report.chunks, 1);

    assert_eq!(search(&p, "").await, input);
}

/// A free-form term only returns the chunks it matches
#[tokio::test]
async fn query_by_gml_id() {
    let input = r#"<c><f gml:id="A">1</f><f gml:id="B">2</f></c>"#;
    let p = pipeline();

    p.importer
        .import(
            Cursor::new(input.to_string()),
            "application/xml",
            meta(),
            "",
        )
        .await
        .unwrap();

    let merged = search(&p, "B").await;
    assert_eq!(
        merged,
        r#"<?xml version="1.0" encoding="UTF-8"?><c><f gml:id="B">2</f></c>"#
    );
}

/// A bracket term becomes a bounding box query
#[tokio::test]
async fn query_by_bbox() {
    let input = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"near","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}},
        {"type":"Feature","id":"far","geometry":{"type":"Point","coordinates":[100,100]},"properties":{}}
    ]}"#;
    let p = pipeline();

    p.importer
        .import(
            Cursor::new(input.to_string()),
            "application/json",
            meta(),
            "",
        )
        .await
        .unwrap();

    let merged = search(&p, "[0,0,10,10]").await;
    let merged: serde_json::Value = serde_json::from_str(&merged).unwrap();
    assert_eq!(merged["id"], "near");

    let inverted = p
        .retriever
        .search("[10,10,0,0]", &mut Cursor::new(Vec::new()))
        .await;
    assert!(matches!(inverted, Err(Error::MalformedQuery { .. })));
}

/// Key-value terms match generic attributes extracted from `properties`
#[tokio::test]
async fn query_by_attribute() {
    let input = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"low","geometry":null,"properties":{"height":5}},
        {"type":"Feature","id":"high","geometry":null,"properties":{"height":25}}
    ]}"#;
    let p = pipeline();

    p.importer
        .import(
            Cursor::new(input.to_string()),
            "application/json",
            meta(),
            "",
        )
        .await
        .unwrap();

    let merged = search(&p, "height>10").await;
    let merged: serde_json::Value = serde_json::from_str(&merged).unwrap();
    assert_eq!(merged["id"], "high");
}

/// Many small batches keep the index in import order
#[tokio::test]
async fn bulk_batches_preserve_order() {
    let features: Vec<String> = (0..25)
        .map(|i| format!(r#"{{"type":"Feature","id":"F{i:02}","properties":{{}}}}"#))
        .collect();
    let input = format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    );
    let p = pipeline_with_bulk_size(Some(4));

    p.importer
        .import(Cursor::new(input), "application/json", meta(), "")
        .await
        .unwrap();

    let paths: Vec<String> = p
        .index
        .get_paths(&IndexQuery::All)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(paths.len(), 25);
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    let merged = search(&p, "").await;
    let merged: serde_json::Value = serde_json::from_str(&merged).unwrap();
    let ids: Vec<String> = merged["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..25).map(|i| format!("F{i:02}")).collect();
    assert_eq!(ids, expected);
}

/// Deleting by query removes chunks from both the index and the store,
/// and doing it twice is harmless
#[tokio::test]
async fn delete_by_query() {
    let input = r#"<c><f gml:id="A"/><f gml:id="B"/></c>"#;
    let p = pipeline();

    p.importer
        .import(
            Cursor::new(input.to_string()),
            "application/xml",
            meta(),
            "",
        )
        .await
        .unwrap();

    let query = IndexQuery::contains("gmlIds", "A");
    assert_eq!(p.coordinator.delete_by_query(&query).await.unwrap(), 1);
    assert_eq!(p.coordinator.delete_by_query(&query).await.unwrap(), 0);

    let merged = search(&p, "").await;
    assert_eq!(
        merged,
        r#"<?xml version="1.0" encoding="UTF-8"?><c><f gml:id="B"/></c>"#
    );
}

/// A cancelled import stops at the next suspension point and leaves
/// nothing half-indexed
#[tokio::test]
async fn cancelled_import() {
    let input = r#"<c><f gml:id="A"/><f gml:id="B"/></c>"#;
    let p = pipeline();

    let (cancel_tx, cancel_rx) = watch::channel(true);
    let r = p
        .importer
        .import_cancellable(
            Cursor::new(input.to_string()),
            "application/xml",
            meta(),
            "",
            cancel_rx,
        )
        .await;
    drop(cancel_tx);
    assert!(matches!(r, Err(Error::Cancelled)));

    let paths: Vec<String> = p
        .index
        .get_paths(&IndexQuery::All)
        .try_collect()
        .await
        .unwrap();
    assert!(paths.is_empty());
}

#[tokio::test]
async fn unsupported_mime_type() {
    let p = pipeline();
    let r = p
        .importer
        .import(
            Cursor::new("x".to_string()),
            "application/x-shapefile",
            meta(),
            "",
        )
        .await;
    assert!(matches!(r, Err(Error::UnsupportedMimeType { .. })));
}

/// A malformed document aborts the import, but chunks committed before the
/// failure stay in the store and the index
#[tokio::test]
async fn malformed_input_keeps_committed_chunks() {
    let input = r#"<c><f gml:id="A"/><broken></c>"#;
    let p = pipeline();

    let r = p
        .importer
        .import(
            Cursor::new(input.to_string()),
            "application/xml",
            meta(),
            "",
        )
        .await;
    assert!(matches!(r, Err(Error::MalformedInput { .. })));

    let paths: Vec<String> = p
        .index
        .get_paths(&IndexQuery::All)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(paths.len(), 1);
}

/// Tags and properties from the import metadata are searchable
#[tokio::test]
async fn tags_and_properties() {
    let input = r#"{"type":"Feature","properties":{}}"#;
    let p = pipeline();

    let import_meta = meta()
        .with_tags(["berlin"])
        .with_properties([("source", "survey")]);
    p.importer
        .import(
            Cursor::new(input.to_string()),
            "application/json",
            import_meta,
            "",
        )
        .await
        .unwrap();

    assert_eq!(search(&p, "berlin").await, input);
    assert_eq!(search(&p, "source:survey").await, input);
    assert_eq!(search(&p, "source:other").await, "");

    let values: Vec<String> = p
        .index
        .get_property_values(&IndexQuery::All, "source")
        .try_collect()
        .await
        .unwrap();
    assert_eq!(values, vec!["survey"]);
}
