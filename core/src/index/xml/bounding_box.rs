use std::str::from_utf8;

use quick_xml::events::{BytesStart, Event};

use georocket_types::{BoundingBox, IndexDocument, Value};

use crate::error::Result;
use crate::index::geo_json::GeoJsonBoundingBoxIndexer;
use crate::index::{
    ChunkIndexer, CrsAware, Indexer, IndexerFactory, QueryPriority, SourceKind,
};
use crate::query::{IndexQuery, QueryPart};

/// Local names of GML elements whose text content is a coordinate list
const COORDINATE_ELEMENTS: &[&[u8]] = &[
    b"lowerCorner",
    b"upperCorner",
    b"posList",
    b"pos",
    b"coordinates",
];

/// Tracks the spatial reference system and dimension declared on the
/// current element or inherited from an ancestor
#[derive(Default)]
struct SrsContext {
    stack: Vec<(Option<String>, Option<u32>)>,
}

impl SrsContext {
    fn push(&mut self, tag: &BytesStart) {
        let mut entry = self.stack.last().cloned().unwrap_or((None, None));
        for attr in tag.attributes().with_checks(false).flatten() {
            match attr.key.local_name().as_ref() {
                b"srsName" => {
                    entry.0 = from_utf8(&attr.value).ok().map(str::to_string);
                }
                b"srsDimension" => {
                    entry.1 = from_utf8(&attr.value).ok().and_then(|v| v.parse().ok());
                }
                _ => {}
            }
        }
        self.stack.push(entry);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn current_srs(&self) -> Option<&String> {
        self.stack.last().and_then(|e| e.0.as_ref())
    }

    fn current_dimension(&self) -> Option<u32> {
        self.stack.last().and_then(|e| e.1)
    }
}

/// Calculates the bounding box of all geometries in a chunk. Coordinates
/// are aggregated as-is; no reprojection is performed. The effective CRS
/// (declared via `srsName` or supplied as a fallback) is recorded alongside.
#[derive(Default)]
pub struct BoundingBoxIndexer {
    srs: SrsContext,

    /// Numbers gathered inside the current coordinate element, if any
    collecting: Option<Vec<f64>>,

    bbox: Option<BoundingBox>,
    crs: Option<String>,
    fallback_crs: Option<String>,
}

impl BoundingBoxIndexer {
    fn is_coordinate_element(local_name: &[u8]) -> bool {
        COORDINATE_ELEMENTS.contains(&local_name)
    }

    fn collect_text(&mut self, text: &str) {
        if self.collecting.is_none() {
            return;
        }

        // gml:coordinates separates tuples with whitespace and ordinates
        // with commas
        let mut parsed = Vec::new();
        for token in text.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            match token.parse::<f64>() {
                Ok(n) => parsed.push(n),
                Err(_) => {
                    // not a coordinate list after all
                    self.collecting = None;
                    return;
                }
            }
        }

        if let Some(numbers) = &mut self.collecting {
            numbers.extend(parsed);
        }
    }

    fn finish_element(&mut self) {
        let Some(numbers) = self.collecting.take() else {
            return;
        };
        if numbers.is_empty() {
            return;
        }

        let dim = match self.srs.current_dimension() {
            Some(d) => d as usize,
            None if numbers.len() % 3 == 0 => 3,
            None if numbers.len() % 2 == 0 => 2,
            None => return,
        };
        if dim < 2 {
            return;
        }

        for point in numbers.chunks_exact(dim) {
            let (x, y) = (point[0], point[1]);
            match &mut self.bbox {
                Some(b) => b.extend_point(x, y),
                None => self.bbox = Some(BoundingBox::point(x, y)),
            }
        }

        if self.crs.is_none() {
            self.crs = self.srs.current_srs().cloned();
        }
    }
}

impl<'a> Indexer<Event<'a>> for BoundingBoxIndexer {
    fn on_event(&mut self, event: &Event<'a>) -> Result<()> {
        match event {
            Event::Start(s) => {
                self.srs.push(s);
                if Self::is_coordinate_element(s.local_name().as_ref()) {
                    self.collecting = Some(Vec::new());
                }
            }

            Event::End(e) => {
                if Self::is_coordinate_element(e.local_name().as_ref()) {
                    self.finish_element();
                }
                self.srs.pop();
            }

            Event::Text(t) => {
                if self.collecting.is_some() {
                    if let Ok(s) = t.unescape() {
                        self.collect_text(&s);
                    }
                }
            }

            Event::CData(d) => {
                if self.collecting.is_some() {
                    if let Ok(s) = from_utf8(d) {
                        self.collect_text(s);
                    }
                }
            }

            _ => {}
        }

        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if let Some(bbox) = self.bbox.take() {
            doc.insert("bbox".to_string(), bbox.to_value());
            if let Some(crs) = self.crs.take().or_else(|| self.fallback_crs.clone()) {
                doc.insert("crs".to_string(), Value::String(crs));
            }
        }
        doc
    }

    fn as_crs_aware(&mut self) -> Option<&mut dyn CrsAware> {
        Some(self)
    }
}

impl CrsAware for BoundingBoxIndexer {
    fn set_fallback_crs(&mut self, crs: &str) {
        self.fallback_crs = Some(crs.to_string());
    }
}

pub struct BoundingBoxIndexerFactory;

impl IndexerFactory for BoundingBoxIndexerFactory {
    fn name(&self) -> &'static str {
        "boundingBox"
    }

    fn create_indexer(&self, kind: SourceKind) -> Option<ChunkIndexer> {
        match kind {
            SourceKind::Xml => Some(ChunkIndexer::Xml(Box::new(BoundingBoxIndexer::default()))),
            SourceKind::GeoJson => Some(ChunkIndexer::GeoJson(Box::new(
                GeoJsonBoundingBoxIndexer::default(),
            ))),
        }
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::Bbox(_) => QueryPriority::Only,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::Bbox(b) => Some(IndexQuery::ElementsWithin(b.bbox)),
            _ => None,
        }
    }
}
