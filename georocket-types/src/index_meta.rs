use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Metadata attached to all chunks of one import request. Immutable once
/// the import has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    /// Opaque string associating all chunks that originated from the same
    /// import request
    pub correlation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Import timestamp in milliseconds since the epoch
    pub timestamp: i64,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub properties: HashMap<String, String>,

    /// Coordinate reference system to assume for chunks that do not declare
    /// one themselves. Recorded only; no reprojection is performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_crs: Option<String>,
}

impl IndexMeta {
    pub fn new(correlation_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            filename: None,
            timestamp,
            tags: BTreeSet::new(),
            properties: HashMap::new(),
            fallback_crs: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_fallback_crs(mut self, crs: impl Into<String>) -> Self {
        self.fallback_crs = Some(crs.into());
        self
    }
}
