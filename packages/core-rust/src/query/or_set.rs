//! `$or` handling: a base range set plus one set per disjunct, peeled
//! clause by clause as each is scanned.

use std::collections::VecDeque;

use tracing::trace;

use crate::value::Document;

use super::predicate::parse_predicate;
use super::range_set::FieldRangeSet;
use super::QueryError;

/// A base [`FieldRangeSet`] (the non-`$or` predicates) plus an ordered list
/// of alternative sets, one per `$or` disjunct.
#[derive(Debug, Clone)]
pub struct FieldRangeOrSet {
    base: FieldRangeSet,
    or_sets: VecDeque<FieldRangeSet>,
    or_found: bool,
}

impl FieldRangeOrSet {
    /// Parses a predicate document, expanding a top-level `$or`.
    ///
    /// A disjunct that constrains nothing makes the whole `$or` useless for
    /// index scanning (it would force a full scan anyway), so the clause
    /// list collapses to empty while `or_finished` reports `true`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BadQuery`] for malformed predicates.
    pub fn new(ns: &str, query: &Document) -> Result<Self, QueryError> {
        let parsed = parse_predicate(query)?;
        let base = FieldRangeSet::from_fields(ns, &parsed.fields)?;

        let or_found = !parsed.or_clauses.is_empty();
        let mut or_sets = VecDeque::with_capacity(parsed.or_clauses.len());
        let mut useless = false;
        for clause in &parsed.or_clauses {
            let set = FieldRangeSet::new(ns, clause)?;
            if set.n_nontrivial_ranges() == 0 {
                useless = true;
            }
            or_sets.push_back(set);
        }
        if useless {
            or_sets.clear();
        }

        Ok(Self {
            base,
            or_sets,
            or_found,
        })
    }

    /// The non-`$or` predicates.
    #[must_use]
    pub fn base(&self) -> &FieldRangeSet {
        &self.base
    }

    /// `true` when a `$or` was present and every clause has been consumed.
    #[must_use]
    pub fn or_finished(&self) -> bool {
        self.or_found && self.or_sets.is_empty()
    }

    /// Remaining disjunct count.
    #[must_use]
    pub fn n_or_clauses(&self) -> usize {
        self.or_sets.len()
    }

    /// The range set to scan next: the base intersected with the front
    /// disjunct. `None` when no disjuncts remain.
    #[must_use]
    pub fn top_set(&self) -> Option<FieldRangeSet> {
        let front = self.or_sets.front()?;
        let mut top = self.base.clone();
        top.intersect_assign(front);
        Some(top)
    }

    /// Simplified predicate documents for the remaining clauses, for
    /// diagnostics.
    #[must_use]
    pub fn all_clauses_simplified(&self) -> Vec<Document> {
        self.or_sets
            .iter()
            .map(FieldRangeSet::simplified_query)
            .collect()
    }

    /// Pops the front disjunct and subtracts its `primary` range from every
    /// remaining disjunct that constrains `primary`, deleting disjuncts
    /// that become unsatisfiable. When `secondary` is also constrained by
    /// the popped clause, the popped `primary` bounds are first made
    /// exclusive: the interior has been scanned but the edges may hold
    /// documents distinguished only by the secondary field.
    ///
    /// Calling with no remaining disjuncts is a no-op.
    pub fn pop_or_clause(&mut self, primary: &str, secondary: Option<&str>) {
        let Some(mut popped) = self.or_sets.pop_front() else {
            return;
        };
        if popped.has_range(primary) {
            if secondary.is_some_and(|s| popped.has_range(s)) {
                popped.range_mut(primary).set_exclusive_bounds();
            }
            let subtracted = popped.range(primary).clone();
            let mut remaining = VecDeque::with_capacity(self.or_sets.len());
            for mut set in std::mem::take(&mut self.or_sets) {
                if set.has_range(primary) {
                    set.range_mut(primary).subtract(&subtracted);
                    if !set.match_possible() {
                        trace!(ns = self.base.ns(), "dropping unsatisfiable or clause");
                        continue;
                    }
                }
                remaining.push_back(set);
            }
            self.or_sets = remaining;
        }
    }

    /// First non-empty `special` annotation of the base set.
    #[must_use]
    pub fn special(&self) -> String {
        self.base.special()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
