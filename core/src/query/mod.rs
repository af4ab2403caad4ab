use std::fmt::{Display, Formatter};

use georocket_types::{BoundingBox, Value};

pub mod compiler;
pub mod parser;

pub use compiler::compile;
pub use parser::parse_query;

/// Specifies how two key-value pairs should be compared to each other
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComparisonOperator {
    /// The values must be equal
    Eq,

    /// The indexed value must be greater than the requested one
    Gt,

    /// The indexed value must be greater than or equal to the requested one
    Gte,

    /// The indexed value must be less than the requested one
    Lt,

    /// The indexed value must be less than or equal to the requested one
    Lte,
}

impl Display for ComparisonOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonOperator::Eq => write!(f, "="),
            ComparisonOperator::Gt => write!(f, ">"),
            ComparisonOperator::Gte => write!(f, ">="),
            ComparisonOperator::Lt => write!(f, "<"),
            ComparisonOperator::Lte => write!(f, "<="),
        }
    }
}

/// A free-form search term
#[derive(Debug, Clone, PartialEq)]
pub struct StringQueryPart {
    pub value: String,
}

/// A `key<op>value` term
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueQueryPart {
    pub key: String,
    pub value: Value,
    pub op: ComparisonOperator,
}

/// A bounding-box term
#[derive(Debug, Clone, PartialEq)]
pub struct BboxQueryPart {
    pub bbox: BoundingBox,
}

/// A single term of a query, the unit handed to indexer factories for
/// compilation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPart {
    String(StringQueryPart),
    KeyValue(KeyValueQueryPart),
    Bbox(BboxQueryPart),
}

impl QueryPart {
    pub fn string(value: impl Into<String>) -> Self {
        QueryPart::String(StringQueryPart {
            value: value.into(),
        })
    }

    pub fn key_value(
        key: impl Into<String>,
        value: impl Into<Value>,
        op: ComparisonOperator,
    ) -> Self {
        QueryPart::KeyValue(KeyValueQueryPart {
            key: key.into(),
            value: value.into(),
            op,
        })
    }

    pub fn bbox(bbox: BoundingBox) -> Self {
        QueryPart::Bbox(BboxQueryPart { bbox })
    }
}

impl Display for QueryPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryPart::String(s) => write!(f, "{}", s.value),
            QueryPart::KeyValue(kv) => match &kv.value {
                Value::String(s) => write!(f, "{}{}{}", kv.key, kv.op, s),
                v => write!(f, "{}{}{:?}", kv.key, kv.op, v),
            },
            QueryPart::Bbox(b) => write!(
                f,
                "[{},{},{},{}]",
                b.bbox.min_x, b.bbox.min_y, b.bbox.max_x, b.bbox.max_y
            ),
        }
    }
}

/// The parsed form of a user query string
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalQuery {
    Term(QueryPart),
    And(Vec<LogicalQuery>),
    Or(Vec<LogicalQuery>),
    Not(Box<LogicalQuery>),
}

impl From<QueryPart> for LogicalQuery {
    fn from(part: QueryPart) -> Self {
        LogicalQuery::Term(part)
    }
}

/// A backend-neutral predicate tree. The query compiler produces it; only
/// the index backend interprets it.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Matches every chunk
    All,

    /// Matches chunks whose bounding box lies completely inside the given one
    ElementsWithin(BoundingBox),

    /// Matches chunks whose bounding box completely contains the given one
    ElementsContain(BoundingBox),

    /// Compares an indexed field (dot-separated path) against a value
    Compare {
        field: String,
        value: Value,
        op: ComparisonOperator,
    },

    /// Matches chunks whose indexed list field contains the given value
    Contains { field: String, value: Value },

    And(Vec<IndexQuery>),
    Or(Vec<IndexQuery>),
    Not(Box<IndexQuery>),
}

impl IndexQuery {
    pub fn compare(
        field: impl Into<String>,
        value: impl Into<Value>,
        op: ComparisonOperator,
    ) -> Self {
        IndexQuery::Compare {
            field: field.into(),
            value: value.into(),
            op,
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        IndexQuery::Contains {
            field: field.into(),
            value: value.into(),
        }
    }
}
