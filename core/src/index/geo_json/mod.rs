pub mod bounding_box;
pub mod id;
pub mod properties;

pub use bounding_box::GeoJsonBoundingBoxIndexer;
pub use id::{GeoJsonIdIndexer, GeoJsonIdIndexerFactory};
pub use properties::PropertiesIndexer;
