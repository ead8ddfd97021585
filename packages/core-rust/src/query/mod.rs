//! Query range analysis.
//!
//! Turns a declarative predicate document into per-field value ranges and an
//! ordered list of index-scan bounds:
//!
//! - [`predicate`]: parse a predicate [`Document`](crate::value::Document)
//!   into typed per-field operators
//! - [`regex`]: anchored-prefix extraction for `$regex` predicates
//! - [`range`]: one field's value range, with the interval algebra
//!   (intersect, union, conservative subtract)
//! - [`range_set`]: per-conjunction field→range maps and index bounds
//! - [`or_set`]: `$or` handling with clause peeling
//! - [`pattern`]: abstract query shapes for plan memoization

pub mod or_set;
pub mod pattern;
pub mod predicate;
pub mod range;
pub mod range_set;
pub mod regex;

pub use or_set::FieldRangeOrSet;
pub use pattern::{normalize_sort, BoundKind, KeyPattern, QueryPattern, SortSpec};
pub use predicate::{parse_predicate, FieldOp, FieldPredicate, ParsedPredicate};
pub use range::{FieldRange, ValueBound, ValueInterval};
pub use range_set::{BoundList, FieldRangeSet, IndexKey};
pub use regex::{simple_regex, simple_regex_end, SimpleRegex};

/// Errors from query analysis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The predicate document is malformed or uses an unknown operator.
    #[error("bad query: {0}")]
    BadQuery(String),
}
