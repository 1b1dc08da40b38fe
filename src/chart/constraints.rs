//! External guidance the chart parser may be asked to respect: a per-token
//! allowed-tag list, and a set of labeled spans the final derivation must
//! realize exactly (guided mode). Grounded on the bracketed-input retry
//! path that raises the minimum constrained-span length from 1 to 2 when a
//! first attempt under-constrains and fails.

use crate::symbol::SymbolId;
use std::collections::HashMap;

/// `allowed[i]` lists the preterminal tags token `i` may be dominated by;
/// an empty (or absent) entry means unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ExtPosConstraints {
    allowed: HashMap<u32, Vec<SymbolId>>,
}

impl ExtPosConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, position: u32, tags: Vec<SymbolId>) {
        self.allowed.insert(position, tags);
    }

    pub fn permits(&self, position: u32, tag: SymbolId) -> bool {
        match self.allowed.get(&position) {
            Some(tags) if !tags.is_empty() => tags.contains(&tag),
            _ => true,
        }
    }
}

/// A single labeled span the derivation must realize: `[start, end)`
/// dominated by exactly `label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanConstraint {
    pub start: u32,
    pub end: u32,
    pub label: SymbolId,
}

/// Guided-mode constraint set: span constraints apply only to spans whose
/// length is at least `min_length`; the parser must reject any edge that
/// would close into a shorter constrained span with the wrong label, and
/// any edge whose span would cross (partially overlap without nesting) a
/// constrained span.
#[derive(Debug, Clone, Default)]
pub struct SpanConstraints {
    spans: Vec<SpanConstraint>,
    min_length: usize,
}

impl SpanConstraints {
    pub fn new(min_length: usize) -> Self {
        SpanConstraints {
            spans: Vec::new(),
            min_length,
        }
    }

    pub fn push(&mut self, constraint: SpanConstraint) {
        self.spans.push(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn applicable(&self, c: &SpanConstraint) -> bool {
        (c.end - c.start) as usize >= self.min_length
    }

    /// `true` if an item `[start, end)` labeled `label` is allowed to be
    /// built: either no applicable constraint mentions this exact span, or
    /// one does and `label` matches it.
    pub fn permits_label(&self, start: u32, end: u32, label: SymbolId) -> bool {
        for c in &self.spans {
            if !self.applicable(c) {
                continue;
            }
            if c.start == start && c.end == end {
                return c.label == label;
            }
        }
        true
    }

    /// `true` if a span `[start, end)` would cross (partially overlap, not
    /// nest inside or contain) a constrained span.
    pub fn crosses_constraint(&self, start: u32, end: u32) -> bool {
        self.spans.iter().filter(|c| self.applicable(c)).any(|c| {
            let nested = start >= c.start && end <= c.end;
            let contains = start <= c.start && end >= c.end;
            let disjoint = end <= c.start || start >= c.end;
            !(nested || contains || disjoint)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_pos_defaults_to_unconstrained() {
        let constraints = ExtPosConstraints::new();
        assert!(constraints.permits(0, 5));
    }

    #[test]
    fn ext_pos_restricts_listed_positions() {
        let mut constraints = ExtPosConstraints::new();
        constraints.set(2, vec![5, 6]);
        assert!(constraints.permits(2, 5));
        assert!(!constraints.permits(2, 7));
        assert!(constraints.permits(3, 7));
    }

    #[test]
    fn span_constraint_below_min_length_is_ignored() {
        let mut spans = SpanConstraints::new(2);
        spans.push(SpanConstraint { start: 0, end: 1, label: 9 });
        assert!(spans.permits_label(0, 1, 42));
    }

    #[test]
    fn crossing_span_is_rejected() {
        let mut spans = SpanConstraints::new(1);
        spans.push(SpanConstraint { start: 1, end: 4, label: 9 });
        assert!(spans.crosses_constraint(2, 5));
        assert!(!spans.crosses_constraint(1, 4));
        assert!(!spans.crosses_constraint(2, 3));
        assert!(!spans.crosses_constraint(0, 5));
    }
}
