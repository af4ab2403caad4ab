//! GeoRocket core: a high-throughput store for large geospatial datasets.
//!
//! XML and GeoJSON inputs of arbitrary size are split into self-contained
//! chunks in constant memory, persisted through a [`store::Store`], indexed
//! through an [`index::Index`], and reassembled into valid documents by the
//! [`output`] mergers when a query matches.

pub mod coordinator;
pub mod error;
pub mod importer;
pub mod index;
pub mod input;
pub mod output;
pub mod query;
pub mod retriever;
pub mod store;
pub mod util;

pub use coordinator::IndexCoordinator;
pub use error::{Error, Result};
pub use importer::{ImportReport, Importer};
pub use retriever::Retriever;
