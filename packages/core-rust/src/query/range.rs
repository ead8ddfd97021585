//! One field's value range.
//!
//! A [`FieldRange`] is an ordered list of non-overlapping intervals over
//! [`Value`]s, built from the operators applied to one field and combined
//! with interval-wise intersection, union, and a deliberately conservative
//! subtraction.
//!
//! Interval endpoints carry an inclusivity flag. Internally each endpoint
//! maps to a *position* `(value, epsilon)`: an inclusive bound sits exactly
//! at the value, an exclusive lower bound just after it, and an exclusive
//! upper bound just before it. Validity, overlap, and adjacency checks are
//! then single lexicographic comparisons.

use std::cmp::Ordering;

use crate::value::Value;

use super::predicate::FieldOp;
use super::regex::{simple_regex, simple_regex_end};
use super::QueryError;

// ---------------------------------------------------------------------------
// ValueBound / ValueInterval
// ---------------------------------------------------------------------------

/// One endpoint of an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueBound {
    pub value: Value,
    pub inclusive: bool,
}

impl ValueBound {
    #[must_use]
    pub fn inclusive(value: Value) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    #[must_use]
    pub fn exclusive(value: Value) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }

    pub fn flip_inclusive(&mut self) {
        self.inclusive = !self.inclusive;
    }
}

/// A closed, open, or half-open interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueInterval {
    pub lower: ValueBound,
    pub upper: ValueBound,
}

/// Position of an endpoint on the value line, as `(value, epsilon)`.
fn lower_pos(b: &ValueBound) -> (&Value, i8) {
    (&b.value, i8::from(!b.inclusive))
}

fn upper_pos(b: &ValueBound) -> (&Value, i8) {
    (&b.value, if b.inclusive { 0 } else { -1 })
}

fn cmp_pos(a: (&Value, i8), b: (&Value, i8)) -> Ordering {
    a.0.cmp(b.0).then(a.1.cmp(&b.1))
}

impl ValueInterval {
    #[must_use]
    pub fn new(lower: ValueBound, upper: ValueBound) -> Self {
        Self { lower, upper }
    }

    /// A single-point interval (inclusive on both sides).
    #[must_use]
    pub fn point(value: Value) -> Self {
        Self {
            lower: ValueBound::inclusive(value.clone()),
            upper: ValueBound::inclusive(value),
        }
    }

    /// The interval covering every value.
    #[must_use]
    pub fn full() -> Self {
        Self {
            lower: ValueBound::inclusive(Value::MinKey),
            upper: ValueBound::inclusive(Value::MaxKey),
        }
    }

    /// `true` when the interval contains at least one position.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        cmp_pos(lower_pos(&self.lower), upper_pos(&self.upper)) != Ordering::Greater
    }

    /// `true` for a single inclusive point.
    #[must_use]
    pub fn is_point(&self) -> bool {
        self.lower.inclusive && self.upper.inclusive && self.lower.value == self.upper.value
    }
}

// ---------------------------------------------------------------------------
// FieldRange
// ---------------------------------------------------------------------------

/// The range of values one field may take, as sorted non-overlapping
/// intervals. An empty interval list means "no value matches".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    intervals: Vec<ValueInterval>,
    special: String,
}

impl FieldRange {
    /// The unconstrained range `[MinKey, MaxKey]`.
    #[must_use]
    pub fn full() -> Self {
        Self {
            intervals: vec![ValueInterval::full()],
            special: String::new(),
        }
    }

    /// The range matching nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
            special: String::new(),
        }
    }

    /// A single-point range.
    #[must_use]
    pub fn point(value: Value) -> Self {
        Self {
            intervals: vec![ValueInterval::point(value)],
            special: String::new(),
        }
    }

    /// Builds a range from intervals: invalid ones are dropped, the rest
    /// sorted and coalesced.
    #[must_use]
    pub fn from_intervals(intervals: Vec<ValueInterval>) -> Self {
        let mut valid: Vec<ValueInterval> =
            intervals.into_iter().filter(ValueInterval::is_valid).collect();
        valid.sort_by(|a, b| cmp_pos(lower_pos(&a.lower), lower_pos(&b.lower)));
        Self {
            intervals: coalesce(valid),
            special: String::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// `true` when the range is the single unconstrained interval.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].lower == ValueBound::inclusive(Value::MinKey)
            && self.intervals[0].upper == ValueBound::inclusive(Value::MaxKey)
    }

    /// The lowest bound.
    ///
    /// # Panics
    ///
    /// Panics on an empty range.
    #[must_use]
    pub fn min(&self) -> &ValueBound {
        assert!(!self.is_empty(), "min() on an empty range");
        &self.intervals[0].lower
    }

    /// The highest bound.
    ///
    /// # Panics
    ///
    /// Panics on an empty range.
    #[must_use]
    pub fn max(&self) -> &ValueBound {
        assert!(!self.is_empty(), "max() on an empty range");
        &self.intervals[self.intervals.len() - 1].upper
    }

    /// `true` when the range is exactly one point.
    #[must_use]
    pub fn equality(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_point()
    }

    /// `true` when every interval is a point (equality or `$in` shape).
    #[must_use]
    pub fn points_only(&self) -> bool {
        !self.is_empty() && self.intervals.iter().all(ValueInterval::is_point)
    }

    /// `true` when the range constrains the field at all: non-empty with a
    /// bound other than the `MinKey`/`MaxKey` extremes.
    #[must_use]
    pub fn nontrivial(&self) -> bool {
        !self.is_empty()
            && (self.min().value != Value::MinKey || self.max().value != Value::MaxKey)
    }

    #[must_use]
    pub fn intervals(&self) -> &[ValueInterval] {
        &self.intervals
    }

    #[must_use]
    pub fn special(&self) -> &str {
        &self.special
    }

    /// Makes every bound exclusive. Point intervals become vacuous but are
    /// retained; subsequent subtraction treats them as subtracting nothing.
    pub fn set_exclusive_bounds(&mut self) {
        for iv in &mut self.intervals {
            iv.lower.inclusive = false;
            iv.upper.inclusive = false;
        }
    }

    fn merge_special(&mut self, other: &FieldRange) {
        if self.special.is_empty() {
            self.special = other.special.clone();
        }
    }

    /// Interval-wise intersection; an empty result is permitted and
    /// propagates.
    pub fn intersect(&mut self, other: &FieldRange) {
        let mut out = Vec::new();
        let (a, b) = (&self.intervals, &other.intervals);
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let lower = if cmp_pos(lower_pos(&a[i].lower), lower_pos(&b[j].lower))
                == Ordering::Less
            {
                b[j].lower.clone()
            } else {
                a[i].lower.clone()
            };
            let a_upper_first = cmp_pos(upper_pos(&a[i].upper), upper_pos(&b[j].upper))
                != Ordering::Greater;
            let upper = if a_upper_first {
                a[i].upper.clone()
            } else {
                b[j].upper.clone()
            };
            let candidate = ValueInterval::new(lower, upper);
            if candidate.is_valid() {
                out.push(candidate);
            }
            if a_upper_first {
                i += 1;
            } else {
                j += 1;
            }
        }
        self.intervals = out;
        self.merge_special(other);
    }

    /// Interval-wise union with coalescing of touching or overlapping
    /// intervals.
    pub fn union_with(&mut self, other: &FieldRange) {
        let mut all: Vec<ValueInterval> = self
            .intervals
            .iter()
            .chain(other.intervals.iter())
            .filter(|iv| iv.is_valid())
            .cloned()
            .collect();
        all.sort_by(|a, b| cmp_pos(lower_pos(&a.lower), lower_pos(&b.lower)));
        self.intervals = coalesce(all);
        self.merge_special(other);
    }

    /// Conservative subtraction: overlapping *edges* of `self`'s intervals
    /// are contracted and fully covered intervals removed, but an `other`
    /// interval strictly inside one of `self`'s leaves it untouched
    /// (`[1,3] - [2,2] = [1,3]`).
    pub fn subtract(&mut self, other: &FieldRange) {
        for iv in &mut self.intervals {
            for sub in &other.intervals {
                if !iv.is_valid() || !sub.is_valid() {
                    continue;
                }
                let al = lower_pos(&iv.lower);
                let au = upper_pos(&iv.upper);
                let bl = lower_pos(&sub.lower);
                let bu = upper_pos(&sub.upper);
                let lower_inside = cmp_pos(bl, al) != Ordering::Greater
                    && cmp_pos(al, bu) != Ordering::Greater;
                let upper_inside = cmp_pos(bl, au) != Ordering::Greater
                    && cmp_pos(au, bu) != Ordering::Greater;
                if lower_inside && upper_inside {
                    // Fully covered: invalidate; filtered below.
                    iv.lower = ValueBound::exclusive(Value::MaxKey);
                    iv.upper = ValueBound::exclusive(Value::MinKey);
                } else if lower_inside {
                    iv.lower = ValueBound {
                        value: sub.upper.value.clone(),
                        inclusive: !sub.upper.inclusive,
                    };
                } else if upper_inside {
                    iv.upper = ValueBound {
                        value: sub.lower.value.clone(),
                        inclusive: !sub.lower.inclusive,
                    };
                }
            }
        }
        self.intervals.retain(ValueInterval::is_valid);
    }

    // -----------------------------------------------------------------------
    // Construction from operators
    // -----------------------------------------------------------------------

    /// Builds the range for a single operator.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BadQuery`] for malformed operator payloads
    /// (currently only invalid `$regex` patterns).
    pub fn from_op(op: &FieldOp) -> Result<Self, QueryError> {
        let range = match op {
            FieldOp::Eq(v) => Self::point(v.clone()),
            FieldOp::Lt(v) => Self::from_intervals(vec![ValueInterval::new(
                ValueBound::inclusive(Value::MinKey),
                ValueBound::exclusive(v.clone()),
            )]),
            FieldOp::Lte(v) => Self::from_intervals(vec![ValueInterval::new(
                ValueBound::inclusive(Value::MinKey),
                ValueBound::inclusive(v.clone()),
            )]),
            FieldOp::Gt(v) => Self::from_intervals(vec![ValueInterval::new(
                ValueBound::exclusive(v.clone()),
                ValueBound::inclusive(Value::MaxKey),
            )]),
            FieldOp::Gte(v) => Self::from_intervals(vec![ValueInterval::new(
                ValueBound::inclusive(v.clone()),
                ValueBound::inclusive(Value::MaxKey),
            )]),
            FieldOp::In(values) => {
                Self::from_intervals(values.iter().cloned().map(ValueInterval::point).collect())
            }
            FieldOp::Ne(v) => complement_of_points(&[v.clone()]),
            FieldOp::Nin(values) => complement_of_points(values),
            FieldOp::Regex { pattern, options } => {
                let sr = simple_regex(pattern, options)?;
                regex_range(&sr.prefix)
            }
            // An array matching all of `values` contains each of them, so a
            // point bound on the first element is a superset scan.
            FieldOp::All(values) => match values.first() {
                Some(v) => Self::point(v.clone()),
                None => Self::empty(),
            },
            FieldOp::Near(_) => {
                let mut r = Self::full();
                r.special = "2d".to_string();
                r
            }
            FieldOp::ElemMatch(_) | FieldOp::Exists(_) | FieldOp::Type(_) | FieldOp::Mod { .. } => {
                Self::full()
            }
            FieldOp::Not(inner) => {
                let mut combined = Self::full();
                for op in inner {
                    combined.intersect(&Self::from_op(op)?);
                }
                // The complement is exact only for point sets; anything else
                // is widened to the full range, matching the conservative
                // superset contract.
                if combined.points_only() {
                    let points: Vec<Value> = combined
                        .intervals
                        .iter()
                        .map(|iv| iv.lower.value.clone())
                        .collect();
                    complement_of_points(&points)
                } else {
                    Self::full()
                }
            }
        };
        Ok(range)
    }
}

impl std::ops::BitAndAssign<&FieldRange> for FieldRange {
    fn bitand_assign(&mut self, rhs: &FieldRange) {
        self.intersect(rhs);
    }
}

impl std::ops::BitOrAssign<&FieldRange> for FieldRange {
    fn bitor_assign(&mut self, rhs: &FieldRange) {
        self.union_with(rhs);
    }
}

impl std::ops::SubAssign<&FieldRange> for FieldRange {
    fn sub_assign(&mut self, rhs: &FieldRange) {
        self.subtract(rhs);
    }
}

/// Coalesces sorted valid intervals, merging touching or overlapping pairs.
fn coalesce(sorted: Vec<ValueInterval>) -> Vec<ValueInterval> {
    let mut out: Vec<ValueInterval> = Vec::with_capacity(sorted.len());
    for iv in sorted {
        match out.last_mut() {
            Some(last) if touches_or_overlaps(&last.upper, &iv.lower) => {
                if cmp_pos(upper_pos(&iv.upper), upper_pos(&last.upper)) == Ordering::Greater {
                    last.upper = iv.upper;
                }
            }
            _ => out.push(iv),
        }
    }
    out
}

/// `true` when no value lies strictly between `upper` (an upper bound) and
/// `lower` (the next interval's lower bound).
fn touches_or_overlaps(upper: &ValueBound, lower: &ValueBound) -> bool {
    match lower.value.cmp(&upper.value) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => {
            let le = i8::from(!lower.inclusive);
            let ue = if upper.inclusive { 0 } else { -1 };
            le <= ue + 1
        }
    }
}

/// The exact complement of a point set over the whole value line.
fn complement_of_points(points: &[Value]) -> FieldRange {
    let mut sorted: Vec<Value> = points.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut intervals = Vec::with_capacity(sorted.len() + 1);
    let mut lower = ValueBound::inclusive(Value::MinKey);
    for p in sorted {
        intervals.push(ValueInterval::new(lower, ValueBound::exclusive(p.clone())));
        lower = ValueBound::exclusive(p);
    }
    intervals.push(ValueInterval::new(
        lower,
        ValueBound::inclusive(Value::MaxKey),
    ));
    FieldRange::from_intervals(intervals)
}

/// The string range for a regex prefix: `[prefix, prefix++1)`, widening to
/// all strings when no prefix or no finite upper bound exists. The upper
/// end of "all strings" is the smallest `Bytes` value, exclusive.
fn regex_range(prefix: &str) -> FieldRange {
    let all_strings_end = ValueBound::exclusive(Value::Bytes(Vec::new()));
    if prefix.is_empty() {
        return FieldRange::from_intervals(vec![ValueInterval::new(
            ValueBound::inclusive(Value::String(String::new())),
            all_strings_end,
        )]);
    }
    let upper = simple_regex_end(prefix)
        .map_or(all_strings_end, |end| ValueBound::exclusive(Value::String(end)));
    FieldRange::from_intervals(vec![ValueInterval::new(
        ValueBound::inclusive(Value::String(prefix.to_string())),
        upper,
    )])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(lo: i64, lo_inc: bool, hi: i64, hi_inc: bool) -> ValueInterval {
        ValueInterval::new(
            ValueBound {
                value: Value::Int(lo),
                inclusive: lo_inc,
            },
            ValueBound {
                value: Value::Int(hi),
                inclusive: hi_inc,
            },
        )
    }

    fn range(intervals: Vec<ValueInterval>) -> FieldRange {
        FieldRange::from_intervals(intervals)
    }

    // -- interval validity --

    #[test]
    fn interval_validity() {
        assert!(iv(1, true, 2, true).is_valid());
        assert!(iv(1, true, 1, true).is_valid());
        assert!(!iv(1, false, 1, true).is_valid());
        assert!(!iv(1, true, 1, false).is_valid());
        assert!(!iv(2, true, 1, true).is_valid());
    }

    // -- construction --

    #[test]
    fn from_intervals_sorts_and_coalesces() {
        let r = range(vec![iv(4, true, 6, true), iv(1, true, 2, true), iv(2, true, 3, true)]);
        assert_eq!(r.intervals().len(), 2);
        assert_eq!(r.intervals()[0], iv(1, true, 3, true));
        assert_eq!(r.intervals()[1], iv(4, true, 6, true));
    }

    #[test]
    fn touching_exclusive_inclusive_coalesces() {
        // [1,2] u (2,3] = [1,3]
        let r = range(vec![iv(1, true, 2, true), iv(2, false, 3, true)]);
        assert_eq!(r.intervals(), [iv(1, true, 3, true)]);

        // [1,2) u (2,3] stays split: 2 is excluded by both.
        let r = range(vec![iv(1, true, 2, false), iv(2, false, 3, true)]);
        assert_eq!(r.intervals().len(), 2);
    }

    #[test]
    fn in_op_sorts_and_dedups() {
        let r = FieldRange::from_op(&FieldOp::In(vec![
            Value::Int(5),
            Value::Int(1),
            Value::Int(5),
            Value::Int(3),
        ]))
        .unwrap();
        assert!(r.points_only());
        assert_eq!(r.intervals().len(), 3);
        assert_eq!(r.min().value, Value::Int(1));
        assert_eq!(r.max().value, Value::Int(5));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let r = FieldRange::from_op(&FieldOp::In(vec![])).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn single_element_in_is_equality() {
        let r = FieldRange::from_op(&FieldOp::In(vec![Value::Int(7)])).unwrap();
        assert!(r.equality());
    }

    #[test]
    fn inequalities_are_half_open() {
        let r = FieldRange::from_op(&FieldOp::Gt(Value::Int(10))).unwrap();
        assert_eq!(r.min().value, Value::Int(10));
        assert!(!r.min().inclusive);
        assert_eq!(r.max().value, Value::MaxKey);

        let r = FieldRange::from_op(&FieldOp::Lte(Value::Int(10))).unwrap();
        assert_eq!(r.max().value, Value::Int(10));
        assert!(r.max().inclusive);
    }

    #[test]
    fn ne_is_exact_point_complement() {
        let r = FieldRange::from_op(&FieldOp::Ne(Value::Int(5))).unwrap();
        assert_eq!(r.intervals().len(), 2);
        assert_eq!(r.intervals()[0].upper, ValueBound::exclusive(Value::Int(5)));
        assert_eq!(r.intervals()[1].lower, ValueBound::exclusive(Value::Int(5)));
    }

    #[test]
    fn not_of_gt_widens_to_full() {
        let r = FieldRange::from_op(&FieldOp::Not(vec![FieldOp::Gt(Value::Int(5))])).unwrap();
        assert!(r.is_full());
    }

    #[test]
    fn not_of_in_is_point_complement() {
        let r = FieldRange::from_op(&FieldOp::Not(vec![FieldOp::In(vec![
            Value::Int(1),
            Value::Int(2),
        ])]))
        .unwrap();
        assert_eq!(r.intervals().len(), 3);
    }

    #[test]
    fn near_records_special() {
        let r = FieldRange::from_op(&FieldOp::Near(vec![Value::Float(1.0), Value::Float(2.0)]))
            .unwrap();
        assert_eq!(r.special(), "2d");
        assert!(r.is_full());
    }

    #[test]
    fn regex_prefix_range() {
        let r = FieldRange::from_op(&FieldOp::Regex {
            pattern: "^abc".to_string(),
            options: String::new(),
        })
        .unwrap();
        assert_eq!(r.min().value, Value::from("abc"));
        assert!(r.min().inclusive);
        assert_eq!(r.max().value, Value::from("abd"));
        assert!(!r.max().inclusive);
    }

    #[test]
    fn regex_without_prefix_covers_all_strings() {
        let r = FieldRange::from_op(&FieldOp::Regex {
            pattern: "abc".to_string(),
            options: String::new(),
        })
        .unwrap();
        assert_eq!(r.min().value, Value::from(""));
        assert_eq!(r.max().value, Value::Bytes(Vec::new()));
        assert!(!r.max().inclusive);
    }

    // -- intersection --

    #[test]
    fn intersect_clips_intervals() {
        let mut a = range(vec![iv(1, true, 10, true)]);
        a.intersect(&range(vec![iv(5, false, 20, true)]));
        assert_eq!(a.intervals(), [iv(5, false, 10, true)]);
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let mut a = range(vec![iv(1, true, 2, true)]);
        a.intersect(&range(vec![iv(3, true, 4, true)]));
        assert!(a.is_empty());
    }

    #[test]
    fn intersect_multi_interval() {
        let mut a = range(vec![iv(0, true, 3, true), iv(6, true, 9, true)]);
        a.intersect(&range(vec![iv(2, true, 7, true)]));
        assert_eq!(a.intervals(), [iv(2, true, 3, true), iv(6, true, 7, true)]);
    }

    #[test]
    fn intersect_self_is_identity() {
        let mut a = range(vec![iv(1, true, 3, false), iv(5, false, 9, true)]);
        let copy = a.clone();
        a.intersect(&copy);
        assert_eq!(a, copy);
    }

    // -- union --

    #[test]
    fn union_merges_overlap() {
        let mut a = range(vec![iv(1, true, 5, true)]);
        a.union_with(&range(vec![iv(3, true, 8, true)]));
        assert_eq!(a.intervals(), [iv(1, true, 8, true)]);
    }

    #[test]
    fn union_keeps_gaps() {
        let mut a = range(vec![iv(1, true, 2, true)]);
        a.union_with(&range(vec![iv(4, true, 5, true)]));
        assert_eq!(a.intervals().len(), 2);
    }

    #[test]
    fn union_self_is_identity() {
        let mut a = range(vec![iv(1, true, 3, false), iv(5, false, 9, true)]);
        let copy = a.clone();
        a.union_with(&copy);
        assert_eq!(a, copy);
    }

    // -- subtraction --

    #[test]
    fn subtract_contracts_overlapping_edges() {
        // [1,10] - [5,20] = [1,5)
        let mut a = range(vec![iv(1, true, 10, true)]);
        a.subtract(&range(vec![iv(5, true, 20, true)]));
        assert_eq!(a.intervals(), [iv(1, true, 5, false)]);

        // [5,20] - [1,10] = (10,20]
        let mut b = range(vec![iv(5, true, 20, true)]);
        b.subtract(&range(vec![iv(1, true, 10, true)]));
        assert_eq!(b.intervals(), [iv(10, false, 20, true)]);
    }

    #[test]
    fn subtract_does_not_remove_contained_intervals() {
        // [1,3] - [2,2] = [1,3]: deliberate conservatism.
        let mut a = range(vec![iv(1, true, 3, true)]);
        a.subtract(&range(vec![iv(2, true, 2, true)]));
        assert_eq!(a.intervals(), [iv(1, true, 3, true)]);
    }

    #[test]
    fn subtract_removes_covered_intervals() {
        let mut a = range(vec![iv(2, true, 3, true)]);
        a.subtract(&range(vec![iv(1, true, 4, true)]));
        assert!(a.is_empty());
    }

    #[test]
    fn subtract_exact_cover_removes() {
        let mut a = range(vec![iv(2, true, 3, true)]);
        a.subtract(&range(vec![iv(2, true, 3, true)]));
        assert!(a.is_empty());
    }

    #[test]
    fn subtract_point_at_edge_excludes_it() {
        // [1,3] - [3,3] = [1,3)
        let mut a = range(vec![iv(1, true, 3, true)]);
        a.subtract(&range(vec![iv(3, true, 3, true)]));
        assert_eq!(a.intervals(), [iv(1, true, 3, false)]);
    }

    #[test]
    fn subtract_vacuous_exclusive_point_is_noop() {
        let mut sub = range(vec![iv(2, true, 2, true)]);
        sub.set_exclusive_bounds();
        let mut a = range(vec![iv(1, true, 3, true)]);
        a.subtract(&sub);
        assert_eq!(a.intervals(), [iv(1, true, 3, true)]);
    }

    // -- predicates about ranges --

    #[test]
    fn full_range_is_trivial() {
        assert!(!FieldRange::full().nontrivial());
        assert!(FieldRange::point(Value::Int(1)).nontrivial());
        assert!(FieldRange::from_op(&FieldOp::Gt(Value::Int(0)))
            .unwrap()
            .nontrivial());
    }

    #[test]
    fn exclusive_bounds_keep_vacuous_points() {
        let mut r = FieldRange::point(Value::Int(2));
        r.set_exclusive_bounds();
        assert_eq!(r.intervals().len(), 1);
        assert!(!r.intervals()[0].is_valid());
        assert!(!r.is_empty());
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::*;

    fn arb_bound() -> impl Strategy<Value = ValueBound> {
        (-20_i64..20, any::<bool>()).prop_map(|(v, inc)| ValueBound {
            value: Value::Int(v),
            inclusive: inc,
        })
    }

    fn arb_range() -> impl Strategy<Value = FieldRange> {
        proptest::collection::vec((arb_bound(), arb_bound()), 0..4).prop_map(|pairs| {
            FieldRange::from_intervals(
                pairs
                    .into_iter()
                    .map(|(a, b)| ValueInterval::new(a, b))
                    .collect(),
            )
        })
    }

    /// Membership probe: is `v` inside the range?
    fn contains(r: &FieldRange, v: i64) -> bool {
        r.intervals().iter().any(|iv| {
            let after_lower = match Value::Int(v).cmp(&iv.lower.value) {
                Ordering::Greater => true,
                Ordering::Equal => iv.lower.inclusive,
                Ordering::Less => false,
            };
            let before_upper = match Value::Int(v).cmp(&iv.upper.value) {
                Ordering::Less => true,
                Ordering::Equal => iv.upper.inclusive,
                Ordering::Greater => false,
            };
            after_lower && before_upper
        })
    }

    proptest! {
        #[test]
        fn union_with_self_is_identity(r in arb_range()) {
            let mut u = r.clone();
            u.union_with(&r);
            prop_assert_eq!(u, r);
        }

        #[test]
        fn intersect_with_self_is_identity(r in arb_range()) {
            let mut i = r.clone();
            i.intersect(&r);
            prop_assert_eq!(i, r);
        }

        #[test]
        fn intersection_is_associative(a in arb_range(), b in arb_range(), c in arb_range()) {
            let mut left = a.clone();
            left.intersect(&b);
            left.intersect(&c);

            let mut bc = b.clone();
            bc.intersect(&c);
            let mut right = a.clone();
            right.intersect(&bc);

            prop_assert_eq!(left, right);
        }

        #[test]
        fn intersection_agrees_with_membership(a in arb_range(), b in arb_range(), v in -25_i64..25) {
            let mut i = a.clone();
            i.intersect(&b);
            prop_assert_eq!(contains(&i, v), contains(&a, v) && contains(&b, v));
        }

        #[test]
        fn union_agrees_with_membership(a in arb_range(), b in arb_range(), v in -25_i64..25) {
            let mut u = a.clone();
            u.union_with(&b);
            prop_assert_eq!(contains(&u, v), contains(&a, v) || contains(&b, v));
        }

        #[test]
        fn subtraction_never_grows_the_range(a in arb_range(), b in arb_range(), v in -25_i64..25) {
            let mut s = a.clone();
            s.subtract(&b);
            // Conservative: s may keep values of b, but never gains values
            // outside a.
            prop_assert!(!contains(&s, v) || contains(&a, v));
        }

        #[test]
        fn subtracting_self_removes_everything(a in arb_range(), v in -25_i64..25) {
            let mut s = a.clone();
            s.subtract(&a);
            prop_assert!(!contains(&s, v));
        }
    }
}
