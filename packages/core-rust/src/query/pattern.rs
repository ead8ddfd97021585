//! Abstract query shapes for plan memoization.
//!
//! Two queries with the same [`QueryPattern`] (the same per-field bound
//! shapes and the same normalized sort) are eligible for the same index
//! plan, so the pattern serves as the memo key.

use std::collections::BTreeMap;

/// How a field's range bounds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoundKind {
    Equality,
    LowerBound,
    UpperBound,
    UpperAndLowerBound,
}

/// An ordered index key or sort specification: `(field, ±1)` components.
pub type KeyPattern = Vec<(String, i32)>;

/// A sort specification before normalization; directions may be any
/// non-zero number.
pub type SortSpec = Vec<(String, i32)>;

/// The shape of a query: field kinds plus a normalized sort.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryPattern {
    field_kinds: BTreeMap<String, BoundKind>,
    sort: KeyPattern,
}

impl QueryPattern {
    #[must_use]
    pub fn new(field_kinds: BTreeMap<String, BoundKind>, sort: &[(String, i32)]) -> Self {
        Self {
            field_kinds,
            sort: normalize_sort(sort),
        }
    }

    #[must_use]
    pub fn field_kinds(&self) -> &BTreeMap<String, BoundKind> {
        &self.field_kinds
    }

    #[must_use]
    pub fn sort(&self) -> &[(String, i32)] {
        &self.sort
    }
}

/// Normalizes a sort: divide every component by the sign of the first, so a
/// sort and its exact reverse share one normal form (`{a:-1, b:1}` and
/// `{a:1, b:-1}` both normalize to `{a:1, b:-1}`).
#[must_use]
pub fn normalize_sort(spec: &[(String, i32)]) -> KeyPattern {
    let Some(first) = spec.first() else {
        return Vec::new();
    };
    let direction = if first.1 >= 0 { 1 } else { -1 };
    spec.iter()
        .map(|(field, n)| {
            let sign = if *n >= 0 { 1 } else { -1 };
            (field.clone(), sign * direction)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
