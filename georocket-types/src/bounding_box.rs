use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An axis-aligned bounding box in `[min_x, min_y, max_x, max_y]` order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 4]", from = "[f64; 4]")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a degenerate bounding box covering a single point
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// `true` if the minimum corner does not exceed the maximum corner
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    /// Grow this bounding box so that it includes the given point
    pub fn extend_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow this bounding box so that it includes the given one
    pub fn extend(&mut self, other: &BoundingBox) {
        self.extend_point(other.min_x, other.min_y);
        self.extend_point(other.max_x, other.max_y);
    }

    /// `true` if `other` lies completely inside this bounding box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn to_value(&self) -> Value {
        Value::List(vec![
            Value::Float(self.min_x),
            Value::Float(self.min_y),
            Value::Float(self.max_x),
            Value::Float(self.max_y),
        ])
    }

    /// Read a bounding box back from an indexed `bbox` field
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) if items.len() == 4 => {
                let mut c = items.iter().filter_map(Value::as_f64);
                Some(Self::new(c.next()?, c.next()?, c.next()?, c.next()?))
            }
            _ => None,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(c: [f64; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}
