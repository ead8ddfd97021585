//! Field range sets: per-conjunction field→range maps and index bounds.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::value::{Document, Value};

use super::pattern::{BoundKind, QueryPattern};
use super::predicate::{parse_predicate, FieldPredicate};
use super::range::{FieldRange, ValueBound, ValueInterval};
use super::QueryError;

/// One composite index key: a bound per index component. Point components
/// are inclusive on both sides; only interval-bearing components carry
/// meaningful exclusivity.
pub type IndexKey = Vec<ValueBound>;

/// Ordered, non-overlapping `(lower, upper)` key pairs to scan, emitted in
/// the direction of traversal.
pub type BoundList = Vec<(IndexKey, IndexKey)>;

/// Guard against `$in`-cross-product explosion in index bounds.
const MAX_BOUND_COMBINATIONS: usize = 1_000_000;

fn trivial_range() -> &'static FieldRange {
    static FULL: OnceLock<FieldRange> = OnceLock::new();
    FULL.get_or_init(FieldRange::full)
}

// ---------------------------------------------------------------------------
// FieldRangeSet
// ---------------------------------------------------------------------------

/// The value ranges of every constrained field for one conjunction of
/// predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRangeSet {
    ns: String,
    ranges: BTreeMap<String, FieldRange>,
}

impl FieldRangeSet {
    /// Builds the range set for a predicate document. A top-level `$or` is
    /// ignored here; [`FieldRangeOrSet`](super::or_set::FieldRangeOrSet)
    /// expands it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BadQuery`] for malformed predicates.
    pub fn new(ns: &str, query: &Document) -> Result<Self, QueryError> {
        let parsed = parse_predicate(query)?;
        Self::from_fields(ns, &parsed.fields)
    }

    /// Builds a range set from already-parsed field predicates.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BadQuery`] for malformed operator payloads.
    pub fn from_fields(ns: &str, fields: &[FieldPredicate]) -> Result<Self, QueryError> {
        let mut ranges: BTreeMap<String, FieldRange> = BTreeMap::new();
        for fp in fields {
            let entry = ranges
                .entry(fp.field.clone())
                .or_insert_with(FieldRange::full);
            for op in &fp.ops {
                entry.intersect(&FieldRange::from_op(op)?);
            }
        }
        Ok(Self {
            ns: ns.to_string(),
            ranges,
        })
    }

    #[must_use]
    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// `true` when the field was mentioned by the predicate.
    #[must_use]
    pub fn has_range(&self, field: &str) -> bool {
        self.ranges.contains_key(field)
    }

    /// The field's range; unconstrained fields get the trivial full range.
    #[must_use]
    pub fn range(&self, field: &str) -> &FieldRange {
        self.ranges.get(field).unwrap_or_else(|| trivial_range())
    }

    /// Mutable access to a field's range, inserting the trivial range for a
    /// previously unconstrained field.
    pub fn range_mut(&mut self, field: &str) -> &mut FieldRange {
        self.ranges
            .entry(field.to_string())
            .or_insert_with(FieldRange::full)
    }

    /// Count of fields whose range actually constrains them.
    #[must_use]
    pub fn n_nontrivial_ranges(&self) -> usize {
        self.ranges.values().filter(|r| r.nontrivial()).count()
    }

    /// `false` as soon as any field's range is empty: no document can
    /// match, and callers short-circuit scanning.
    #[must_use]
    pub fn match_possible(&self) -> bool {
        self.ranges.values().all(|r| !r.is_empty())
    }

    /// First non-empty `special` annotation among the ranges (e.g. `"2d"`).
    #[must_use]
    pub fn special(&self) -> String {
        self.ranges
            .values()
            .map(FieldRange::special)
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_string()
    }

    /// Intersects with another set: common fields clip, fields unique to
    /// `other` are copied in.
    pub fn intersect_assign(&mut self, other: &FieldRangeSet) {
        for (field, range) in &other.ranges {
            match self.ranges.get_mut(field) {
                Some(mine) => mine.intersect(range),
                None => {
                    self.ranges.insert(field.clone(), range.clone());
                }
            }
        }
    }

    /// Subtracts another set field-wise; fields unique to either side are
    /// untouched.
    pub fn subtract_assign(&mut self, other: &FieldRangeSet) {
        for (field, range) in &other.ranges {
            if let Some(mine) = self.ranges.get_mut(field) {
                mine.subtract(range);
            }
        }
    }

    /// Derives the abstract query shape for plan memoization.
    #[must_use]
    pub fn pattern(&self, sort: &[(String, i32)]) -> QueryPattern {
        let mut kinds = BTreeMap::new();
        for (field, range) in &self.ranges {
            if range.is_empty() {
                continue;
            }
            if range.equality() {
                kinds.insert(field.clone(), BoundKind::Equality);
            } else if range.nontrivial() {
                let lower = range.min().value != Value::MinKey;
                let upper = range.max().value != Value::MaxKey;
                let kind = match (lower, upper) {
                    (true, true) => BoundKind::UpperAndLowerBound,
                    (true, false) => BoundKind::LowerBound,
                    // nontrivial() guarantees at least one real bound
                    _ => BoundKind::UpperBound,
                };
                kinds.insert(field.clone(), kind);
            }
        }
        QueryPattern::new(kinds, sort)
    }

    /// A simplified predicate document reconstructed from the ranges, for
    /// diagnostics.
    #[must_use]
    pub fn simplified_query(&self) -> Document {
        let mut out = Document::new();
        for (field, range) in &self.ranges {
            if !range.nontrivial() {
                continue;
            }
            if range.equality() {
                out.insert(field.clone(), range.min().value.clone());
            } else if range.points_only() {
                let points: Vec<Value> = range
                    .intervals()
                    .iter()
                    .map(|iv| iv.lower.value.clone())
                    .collect();
                let mut ops = BTreeMap::new();
                ops.insert("$in".to_string(), Value::Array(points));
                out.insert(field.clone(), Value::Map(ops));
            } else {
                let mut ops = BTreeMap::new();
                let min = range.min();
                let max = range.max();
                if min.value != Value::MinKey {
                    let op = if min.inclusive { "$gte" } else { "$gt" };
                    ops.insert(op.to_string(), min.value.clone());
                }
                if max.value != Value::MaxKey {
                    let op = if max.inclusive { "$lte" } else { "$lt" };
                    ops.insert(op.to_string(), max.value.clone());
                }
                out.insert(field.clone(), Value::Map(ops));
            }
        }
        out
    }

    /// Generates the ordered scan bounds for an index.
    ///
    /// Walks the key pattern components in order, cross-multiplying the
    /// accumulated partial bounds with each component's intervals until the
    /// first non-point component; later components contribute only their
    /// overall min/max. Descending components (or reverse traversal) take
    /// their intervals in reverse with the endpoints swapped. An empty
    /// range on any component means no document can match: the bound list
    /// is empty.
    #[must_use]
    pub fn index_bounds(&self, key_pattern: &[(String, i32)], direction: i32) -> BoundList {
        let mut builders: BoundList = vec![(Vec::new(), Vec::new())];
        let mut inequality_seen = false;

        for (field, key_dir) in key_pattern {
            let range = self.range(field);
            if range.is_empty() {
                return Vec::new();
            }
            let forward = (*key_dir >= 0) == (direction >= 0);

            if !inequality_seen && range.equality() {
                let point = ValueBound::inclusive(range.min().value.clone());
                for (lower, upper) in &mut builders {
                    lower.push(point.clone());
                    upper.push(point.clone());
                }
            } else if inequality_seen {
                // Past the first inequality only the overall extremes
                // contribute.
                let (lo, hi) = directed_extremes(range, forward);
                for (lower, upper) in &mut builders {
                    lower.push(lo.clone());
                    upper.push(hi.clone());
                }
            } else {
                if !range.points_only() {
                    inequality_seen = true;
                }
                let mut next: BoundList =
                    Vec::with_capacity(builders.len() * range.intervals().len());
                let intervals: Vec<&ValueInterval> = if forward {
                    range.intervals().iter().collect()
                } else {
                    range.intervals().iter().rev().collect()
                };
                for (lower, upper) in &builders {
                    for iv in &intervals {
                        assert!(
                            next.len() < MAX_BOUND_COMBINATIONS,
                            "combinatorial limit of $in partitioning exceeded"
                        );
                        let (lo, hi) = if forward {
                            (iv.lower.clone(), iv.upper.clone())
                        } else {
                            (iv.upper.clone(), iv.lower.clone())
                        };
                        let mut l = lower.clone();
                        let mut u = upper.clone();
                        l.push(lo);
                        u.push(hi);
                        next.push((l, u));
                    }
                }
                builders = next;
            }
        }
        builders
    }
}

fn directed_extremes(range: &FieldRange, forward: bool) -> (ValueBound, ValueBound) {
    if forward {
        (range.min().clone(), range.max().clone())
    } else {
        (range.max().clone(), range.min().clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
