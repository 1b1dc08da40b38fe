//! A chart cell: a labeled, completed span that may be shared by many
//! parent edges.

use crate::arena::Id;
use crate::symbol::SymbolId;
use crate::vocab::{VocabId, Word};
use log_domain::LogDomain;
use num_traits::Zero;

use super::edge::EdgeId;

pub type ItemId = Id<Item>;

#[derive(Debug, Clone)]
pub struct Item {
    pub lhs: SymbolId,
    pub start: u32,
    pub finish: u32,
    pub head: Option<Word>,
    pub inside: LogDomain<f64>,
    /// finished edges built by combining through this item (this item was
    /// one of their consumed children); demerited/resifted when `inside`
    /// improves past what they were built from.
    pub needed_by: Vec<EdgeId>,
    /// every distinct finished edge whose LHS/span matches this item —
    /// each is one candidate derivation, not a duplicate (duplicates are
    /// merged before reaching this list).
    pub finishing_edges: Vec<EdgeId>,
}

impl Item {
    pub fn new(lhs: SymbolId, start: u32, finish: u32) -> Self {
        Item {
            lhs,
            start,
            finish,
            head: None,
            inside: LogDomain::zero(),
            needed_by: Vec::new(),
            finishing_edges: Vec::new(),
        }
    }

    pub fn span(&self) -> (u32, u32) {
        (self.start, self.finish)
    }

    pub fn vocab_head(&self) -> Option<VocabId> {
        self.head.as_ref().map(|w| w.vocab)
    }
}
