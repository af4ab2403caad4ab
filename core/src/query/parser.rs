use chumsky::{prelude::*, text::whitespace};

use georocket_types::{BoundingBox, Value};

use crate::error::{Error, Result};

use super::{
    BboxQueryPart, ComparisonOperator, KeyValueQueryPart, LogicalQuery, QueryPart, StringQueryPart,
};

const KEYWORDS: &[&str] = &["AND", "OR", "NOT"];

/// Parse a user query string into a [`LogicalQuery`]. An empty (or
/// all-whitespace) string means "match everything" and yields `None`.
pub fn parse_query(query: &str) -> Result<Option<LogicalQuery>> {
    if query.trim().is_empty() {
        return Ok(None);
    }

    parser()
        .parse(query)
        .into_result()
        .map(Some)
        .map_err(|errs| {
            let msg = errs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Error::malformed_query(msg)
        })
}

/// A keyword must be followed by whitespace or an opening parenthesis so
/// that words like `ANDROID` still parse as plain terms
fn keyword<'a>(
    kw: &'static str,
) -> impl Parser<'a, &'a str, (), extra::Err<Rich<'a, char>>> + Clone {
    just(kw)
        .then(choice((
            whitespace().at_least(1).ignored(),
            just('(').rewind().ignored(),
        )))
        .ignored()
}

fn parser<'a>() -> impl Parser<'a, &'a str, LogicalQuery, extra::Err<Rich<'a, char>>> {
    recursive(|expr| {
        let double_quoted = choice((just("\\\"").to('"'), none_of('"')))
            .repeated()
            .collect::<String>()
            .delimited_by(just('"'), just('"'));

        let single_quoted = choice((just("\\'").to('\''), none_of('\'')))
            .repeated()
            .collect::<String>()
            .delimited_by(just('\''), just('\''));

        let quoted = double_quoted.or(single_quoted);

        let bareword = any()
            .filter(|c: &char| !c.is_whitespace() && !"()[]<>:=\"'".contains(*c))
            .repeated()
            .at_least(1)
            .collect::<String>();

        let word = bareword.clone().try_map(|s: String, span| {
            if KEYWORDS.contains(&s.as_str()) {
                Err(Rich::custom(span, "unexpected keyword"))
            } else {
                Ok(s)
            }
        });

        let number = any()
            .filter(|c: &char| c.is_ascii_digit() || "+-.eE".contains(*c))
            .repeated()
            .at_least(1)
            .to_slice()
            .try_map(|s: &str, span| {
                s.parse::<f64>()
                    .map_err(|_| Rich::custom(span, "invalid number"))
            });

        let bbox = number
            .padded()
            .separated_by(just(','))
            .exactly(4)
            .collect::<Vec<f64>>()
            .delimited_by(just('['), just(']'))
            .map(|c| {
                QueryPart::Bbox(BboxQueryPart {
                    bbox: BoundingBox::new(c[0], c[1], c[2], c[3]),
                })
            });

        let op = choice((
            just(">=").to(ComparisonOperator::Gte),
            just("<=").to(ComparisonOperator::Lte),
            just('>').to(ComparisonOperator::Gt),
            just('<').to(ComparisonOperator::Lt),
            just(':').to(ComparisonOperator::Eq),
        ));

        // quoted values stay strings; barewords are auto-converted to
        // numbers where possible
        let value = choice((
            quoted.clone().map(Value::String),
            bareword.clone().map(|s: String| Value::parse_lenient(&s)),
        ));

        let key_value = choice((quoted.clone(), word.clone()))
            .then(op)
            .then(value)
            .map(|((key, op), value)| QueryPart::KeyValue(KeyValueQueryPart { key, value, op }));

        let term = choice((
            bbox,
            key_value,
            quoted.map(|v: String| QueryPart::String(StringQueryPart { value: v })),
            word.map(|v: String| QueryPart::String(StringQueryPart { value: v })),
        ))
        .map(LogicalQuery::Term);

        let atom = choice((
            expr.delimited_by(just('(').padded(), just(')').padded()),
            term.padded(),
        ));

        let not = recursive(|not| {
            keyword("NOT")
                .padded()
                .ignore_then(not)
                .map(|q| LogicalQuery::Not(Box::new(q)))
                .or(atom)
        });

        let and_seq = not
            .separated_by(keyword("AND").padded())
            .at_least(1)
            .collect::<Vec<_>>()
            .map(collapse_and);

        let or_seq = and_seq
            .separated_by(keyword("OR").padded())
            .at_least(1)
            .collect::<Vec<_>>()
            .map(collapse_or);

        // adjacent groups without an explicit operator combine as OR
        or_seq
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(collapse_or)
    })
    .then_ignore(end())
}

fn collapse_and(mut parts: Vec<LogicalQuery>) -> LogicalQuery {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        LogicalQuery::And(
            parts
                .into_iter()
                .flat_map(|q| match q {
                    LogicalQuery::And(inner) => inner,
                    q => vec![q],
                })
                .collect(),
        )
    }
}

fn collapse_or(mut parts: Vec<LogicalQuery>) -> LogicalQuery {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        LogicalQuery::Or(
            parts
                .into_iter()
                .flat_map(|q| match q {
                    LogicalQuery::Or(inner) => inner,
                    q => vec![q],
                })
                .collect(),
        )
    }
}
