pub mod bounding_box;
pub mod generic_attributes;
pub mod gml_id;
pub mod xal_address;

pub use bounding_box::{BoundingBoxIndexer, BoundingBoxIndexerFactory};
pub use generic_attributes::{GenericAttributeIndexer, GenericAttributeIndexerFactory};
pub use gml_id::{GmlIdIndexer, GmlIdIndexerFactory};
pub use xal_address::{XalAddressIndexer, XalAddressIndexerFactory};
