use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::{IndexerFactory, QueryPriority};

use super::{parse_query, IndexQuery, LogicalQuery, QueryPart};

/// Compile a user query string into a backend-neutral [`IndexQuery`] by
/// polling the given indexer factories for every term. An empty query
/// matches everything.
pub fn compile(query: &str, factories: &[Arc<dyn IndexerFactory>]) -> Result<IndexQuery> {
    match parse_query(query)? {
        None => Ok(IndexQuery::All),
        Some(q) => compile_logical(&q, factories),
    }
}

fn compile_logical(
    query: &LogicalQuery,
    factories: &[Arc<dyn IndexerFactory>],
) -> Result<IndexQuery> {
    match query {
        LogicalQuery::Term(part) => compile_term(part, factories),
        LogicalQuery::And(parts) => Ok(IndexQuery::And(
            parts
                .iter()
                .map(|p| compile_logical(p, factories))
                .collect::<Result<_>>()?,
        )),
        LogicalQuery::Or(parts) => Ok(IndexQuery::Or(
            parts
                .iter()
                .map(|p| compile_logical(p, factories))
                .collect::<Result<_>>()?,
        )),
        LogicalQuery::Not(part) => Ok(IndexQuery::Not(Box::new(compile_logical(
            part, factories,
        )?))),
    }
}

fn compile_term(part: &QueryPart, factories: &[Arc<dyn IndexerFactory>]) -> Result<IndexQuery> {
    if let QueryPart::Bbox(b) = part {
        if !b.bbox.is_valid() {
            return Err(Error::malformed_query(format!(
                "inverted bounding box coordinates: {part}"
            )));
        }
    }

    // a factory claiming exclusive responsibility is the sole producer
    if let Some(f) = factories
        .iter()
        .find(|f| f.query_priority(part) == QueryPriority::Only)
    {
        return f.compile_query(part).ok_or_else(|| unmatchable(part));
    }

    let mut musts = Vec::new();
    let mut shoulds = Vec::new();
    for f in factories {
        match f.query_priority(part) {
            QueryPriority::Must => {
                if let Some(q) = f.compile_query(part) {
                    musts.push(q);
                }
            }
            QueryPriority::Should => match f.compile_query(part) {
                // flatten alternatives so that one factory contributing
                // several options reads the same as several factories
                Some(IndexQuery::Or(inner)) => shoulds.extend(inner),
                Some(q) => shoulds.push(q),
                None => {}
            },
            QueryPriority::None | QueryPriority::Only => {}
        }
    }

    let should = match shoulds.len() {
        0 => None,
        1 => Some(shoulds.remove(0)),
        _ => Some(IndexQuery::Or(shoulds)),
    };

    match (musts.is_empty(), should) {
        (true, None) => Err(unmatchable(part)),
        (true, Some(s)) => Ok(s),
        (false, None) => {
            if musts.len() == 1 {
                Ok(musts.remove(0))
            } else {
                Ok(IndexQuery::And(musts))
            }
        }
        (false, Some(s)) => {
            musts.push(s);
            Ok(IndexQuery::And(musts))
        }
    }
}

fn unmatchable(part: &QueryPart) -> Error {
    Error::UnmatchableTerm {
        term: part.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use georocket_types::BoundingBox;

    use crate::error::Error;
    use crate::index::geo_json::GeoJsonIdIndexerFactory;
    use crate::index::xml::{BoundingBoxIndexerFactory, XalAddressIndexerFactory};
    use crate::index::{ChunkIndexer, IndexerFactory, QueryPriority, SourceKind};
    use crate::query::{ComparisonOperator, IndexQuery, QueryPart};

    use super::compile;

    /// A factory that records how often its `compile_query` is called
    struct CountingFactory {
        priority: QueryPriority,
        compiled: AtomicUsize,
        result: Option<IndexQuery>,
    }

    impl CountingFactory {
        fn new(priority: QueryPriority, result: Option<IndexQuery>) -> Self {
            Self {
                priority,
                compiled: AtomicUsize::new(0),
                result,
            }
        }
    }

    impl IndexerFactory for CountingFactory {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn create_indexer(&self, _kind: SourceKind) -> Option<ChunkIndexer> {
            None
        }

        fn query_priority(&self, _part: &QueryPart) -> QueryPriority {
            self.priority
        }

        fn compile_query(&self, _part: &QueryPart) -> Option<IndexQuery> {
            self.compiled.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    #[test]
    fn empty_query_matches_all() {
        let r = compile("", &[]).unwrap();
        assert_eq!(r, IndexQuery::All);
    }

    #[test]
    fn unmatchable_term() {
        let factories: Vec<Arc<dyn IndexerFactory>> = vec![Arc::new(CountingFactory::new(
            QueryPriority::None,
            Some(IndexQuery::All),
        ))];
        let r = compile("foo", &factories);
        assert!(matches!(r, Err(Error::UnmatchableTerm { term }) if term == "foo"));
    }

    /// If a factory returns `Only`, no other factory's `compile_query` is
    /// called for that term
    #[test]
    fn only_dominates() {
        let other = Arc::new(CountingFactory::new(
            QueryPriority::Should,
            Some(IndexQuery::contains("tags", "x")),
        ));
        let factories: Vec<Arc<dyn IndexerFactory>> =
            vec![other.clone(), Arc::new(BoundingBoxIndexerFactory)];

        let r = compile("[1,2,3,4]", &factories).unwrap();
        assert_eq!(
            r,
            IndexQuery::ElementsWithin(BoundingBox::new(1.0, 2.0, 3.0, 4.0))
        );
        assert_eq!(other.compiled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn must_and_should_combine_with_and() {
        let factories: Vec<Arc<dyn IndexerFactory>> = vec![
            Arc::new(CountingFactory::new(
                QueryPriority::Must,
                Some(IndexQuery::contains("a", "x")),
            )),
            Arc::new(CountingFactory::new(
                QueryPriority::Should,
                Some(IndexQuery::contains("b", "x")),
            )),
        ];
        let r = compile("x", &factories).unwrap();
        assert_eq!(
            r,
            IndexQuery::And(vec![
                IndexQuery::contains("a", "x"),
                IndexQuery::contains("b", "x"),
            ])
        );
    }

    #[test]
    fn inverted_bbox_is_malformed() {
        let factories: Vec<Arc<dyn IndexerFactory>> = vec![Arc::new(BoundingBoxIndexerFactory)];
        let r = compile("[3,2,1,4]", &factories);
        assert!(matches!(r, Err(Error::MalformedQuery { .. })));
    }

    /// A free-form term compiles to the union of everything the registered
    /// factories can match it against
    #[test]
    fn string_term_fans_out() {
        let factories: Vec<Arc<dyn IndexerFactory>> = vec![
            Arc::new(GeoJsonIdIndexerFactory),
            Arc::new(XalAddressIndexerFactory),
        ];
        let r = compile("Berlin", &factories).unwrap();

        let IndexQuery::Or(parts) = r else {
            panic!("expected a union");
        };
        assert_eq!(
            parts[0],
            IndexQuery::contains("geoJsonFeatureIds", "Berlin")
        );
        assert!(parts.contains(&IndexQuery::compare(
            "address.Country",
            "Berlin",
            ComparisonOperator::Eq
        )));
        assert!(parts.contains(&IndexQuery::compare(
            "address.Locality",
            "Berlin",
            ComparisonOperator::Eq
        )));
        assert!(parts.contains(&IndexQuery::compare(
            "address.Thoroughfare",
            "Berlin",
            ComparisonOperator::Eq
        )));
    }
}
