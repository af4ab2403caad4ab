use actson::JsonEvent;

use georocket_types::{BoundingBox, IndexDocument};

use crate::error::Result;
use crate::index::{GeoJsonEvent, Indexer, JsonPayload};

/// Calculates the bounding box of all `coordinates` members in a GeoJSON
/// chunk. Positions are `[x, y]` or `[x, y, z]`; the third ordinate is
/// ignored.
#[derive(Default)]
pub struct GeoJsonBoundingBoxIndexer {
    /// `true` right after a `coordinates` field name was seen
    await_coordinates: bool,

    /// Array nesting level inside a `coordinates` member, 0 when outside
    depth: u32,

    /// Position of the next number within the innermost array
    axis: usize,

    x: f64,
    bbox: Option<BoundingBox>,
}

impl GeoJsonBoundingBoxIndexer {
    fn push_number(&mut self, v: f64) {
        match self.axis {
            0 => self.x = v,
            1 => match &mut self.bbox {
                Some(b) => b.extend_point(self.x, v),
                None => self.bbox = Some(BoundingBox::point(self.x, v)),
            },
            _ => {}
        }
        self.axis += 1;
    }
}

impl Indexer<GeoJsonEvent> for GeoJsonBoundingBoxIndexer {
    fn on_event(&mut self, event: &GeoJsonEvent) -> Result<()> {
        let (event, payload) = event;
        match event {
            JsonEvent::FieldName => {
                self.await_coordinates =
                    matches!(payload, JsonPayload::String(s) if s == "coordinates");
            }

            JsonEvent::StartArray => {
                if self.await_coordinates {
                    self.await_coordinates = false;
                    self.depth = 1;
                } else if self.depth > 0 {
                    self.depth += 1;
                }
                self.axis = 0;
            }

            JsonEvent::EndArray => {
                self.depth = self.depth.saturating_sub(1);
            }

            JsonEvent::ValueInt if self.depth > 0 => {
                if let JsonPayload::Int(v) = payload {
                    self.push_number(*v as f64);
                }
            }

            JsonEvent::ValueFloat if self.depth > 0 => {
                if let JsonPayload::Double(v) = payload {
                    self.push_number(*v);
                }
            }

            _ => {
                self.await_coordinates = false;
            }
        }

        Ok(())
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if let Some(bbox) = self.bbox.take() {
            doc.insert("bbox".to_string(), bbox.to_value());
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use georocket_types::BoundingBox;

    use crate::index::{drive_json_indexer, Indexer};

    use super::GeoJsonBoundingBoxIndexer;

    fn bbox_of(json: &str) -> Option<BoundingBox> {
        let mut indexer = GeoJsonBoundingBoxIndexer::default();
        drive_json_indexer(json, &mut indexer);
        let doc = indexer.make_result();
        doc.get("bbox").and_then(BoundingBox::from_value)
    }

    #[test]
    fn point() {
        let b = bbox_of(r#"{"type":"Point","coordinates":[1,2]}"#).unwrap();
        assert_eq!(b, BoundingBox::new(1.0, 2.0, 1.0, 2.0));
    }

    #[test]
    fn polygon_with_z() {
        let b = bbox_of(
            r#"{"type":"Polygon","coordinates":[[[1,2,99],[3,4,99],[1,4,99],[1,2,99]]]}"#,
        )
        .unwrap();
        assert_eq!(b, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn feature_with_nested_geometry() {
        let b = bbox_of(
            r#"{"type":"Feature","properties":{"height":3},"geometry":{"type":"LineString","coordinates":[[-1,0],[5,7]]}}"#,
        )
        .unwrap();
        assert_eq!(b, BoundingBox::new(-1.0, 0.0, 5.0, 7.0));
    }

    #[test]
    fn no_geometry() {
        assert!(bbox_of(r#"{"type":"Feature","properties":{}}"#).is_none());
    }
}
