//! N-best derivation extraction: a second best-first search, this time over
//! partial derivation trees rather than edges. Each item's candidate
//! derivations are produced lazily, ranked by inside probability, using the
//! standard "ranked-list with a local candidate frontier" technique: the
//! k-th best derivation of an item is only computed once the (k-1)-th has
//! been consumed, and its successors (incrementing one child's rank) seed
//! the frontier for the next request.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::arena::{Arena, Id};
use crate::symbol::SymbolId;
use crate::vocab::VocabId;
use log_domain::LogDomain;

use super::edge::{Edge, EdgeId};
use super::item::{Item, ItemId};

pub type AnswerTreeId = Id<AnswerTree>;

#[derive(Debug, Clone)]
pub struct AnswerTree {
    pub terminal: SymbolId,
    pub word: Option<VocabId>,
    pub children: Vec<AnswerTreeId>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    prob: LogDomain<f64>,
    tree: AnswerTreeId,
}
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.prob == other.prob
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prob.cmp(&other.prob)
    }
}

/// A fixed-capacity min-heap of completed derivations, keyed by probability
/// (highest is best); on overflow the worst entry is evicted.
#[derive(Debug)]
pub struct AnsTreeHeap {
    capacity: usize,
    heap: BinaryHeap<Reverse<Entry>>,
}

impl AnsTreeHeap {
    pub fn new(capacity: usize) -> Self {
        AnsTreeHeap {
            capacity,
            heap: BinaryHeap::new(),
        }
    }

    pub fn insert(&mut self, prob: LogDomain<f64>, tree: AnswerTreeId) {
        self.heap.push(Reverse(Entry { prob, tree }));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Entries best-first.
    pub fn into_ranked(self) -> Vec<(LogDomain<f64>, AnswerTreeId)> {
        let mut v: Vec<_> = self
            .heap
            .into_iter()
            .map(|Reverse(e)| (e.prob, e.tree))
            .collect();
        v.sort_by(|a, b| b.0.cmp(&a.0));
        v
    }
}

#[derive(Debug, Clone)]
struct Derivation {
    edge: EdgeId,
    /// rank chosen for each child item, aligned with `edge_children(edge)`.
    ranks: Vec<usize>,
    prob: LogDomain<f64>,
}

/// walks `edge`'s `pred` chain to recover the left-to-right sequence of
/// child items it consumed.
fn edge_children(edges: &Arena<Edge>, edge: EdgeId) -> Vec<ItemId> {
    let mut items = Vec::new();
    let mut cur = Some(edge);
    while let Some(id) = cur {
        let e = edges.get(id);
        if let Some(item) = e.item {
            items.push(item);
        }
        cur = e.pred;
    }
    items.reverse();
    items
}

/// Lazily ranks derivations per item, ordered by descending probability,
/// bounded by an overall operation budget shared across the whole
/// extraction.
pub struct DerivationTable<'a> {
    items: &'a Arena<Item>,
    edges: &'a Arena<Edge>,
    lists: HashMap<ItemId, Vec<Derivation>>,
    frontier: HashMap<ItemId, BinaryHeap<RankedCandidate>>,
    seen: HashMap<ItemId, HashSet<Vec<usize>>>,
    budget: usize,
    spent: usize,
}

#[derive(Debug, Clone)]
struct RankedCandidate {
    edge: EdgeId,
    ranks: Vec<usize>,
    prob: LogDomain<f64>,
}
impl PartialEq for RankedCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.prob == other.prob
    }
}
impl Eq for RankedCandidate {}
impl PartialOrd for RankedCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RankedCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prob.cmp(&other.prob)
    }
}

impl<'a> DerivationTable<'a> {
    pub fn new(items: &'a Arena<Item>, edges: &'a Arena<Edge>, budget: usize) -> Self {
        DerivationTable {
            items,
            edges,
            lists: HashMap::new(),
            frontier: HashMap::new(),
            seen: HashMap::new(),
            budget,
            spent: 0,
        }
    }

    fn derivation_prob(&mut self, edge: EdgeId, ranks: &[usize]) -> Option<LogDomain<f64>> {
        let children = edge_children(self.edges, edge);
        let mut prob = self.edges.get(edge).inside;
        for (&rank, &child) in ranks.iter().zip(children.iter()) {
            let child_prob = self.kth(child, rank)?;
            prob = prob * child_prob;
        }
        Some(prob)
    }

    fn seed_frontier(&mut self, item: ItemId) {
        let mut heap = BinaryHeap::new();
        for &edge in &self.items.get(item).finishing_edges.clone() {
            let arity = edge_children(self.edges, edge).len();
            let ranks = vec![0; arity];
            if let Some(prob) = self.derivation_prob(edge, &ranks) {
                heap.push(RankedCandidate { edge, ranks, prob });
            }
        }
        self.frontier.insert(item, heap);
        self.seen.insert(item, HashSet::new());
    }

    /// Returns the k-th best (0-indexed) derivation probability for `item`,
    /// or `None` once exhausted or the operation budget runs out.
    pub fn kth(&mut self, item: ItemId, k: usize) -> Option<LogDomain<f64>> {
        if let Some(list) = self.lists.get(&item) {
            if k < list.len() {
                return Some(list[k].prob);
            }
        }
        if !self.frontier.contains_key(&item) {
            self.seed_frontier(item);
        }
        while self.lists.get(&item).map_or(0, |l| l.len()) <= k {
            if self.spent >= self.budget {
                return None;
            }
            self.spent += 1;
            let best = self.frontier.get_mut(&item)?.pop()?;
            let children = edge_children(self.edges, best.edge);
            let entry = Derivation {
                edge: best.edge,
                ranks: best.ranks.clone(),
                prob: best.prob,
            };
            self.lists.entry(item).or_default().push(entry);

            for (i, &child) in children.iter().enumerate() {
                let mut next_ranks = best.ranks.clone();
                next_ranks[i] += 1;
                let key = {
                    let mut k = next_ranks.clone();
                    k.push(best.edge.index());
                    k
                };
                if self.seen.get(&item).map_or(false, |s| s.contains(&key)) {
                    continue;
                }
                if self.kth(child, next_ranks[i]).is_none() {
                    continue;
                }
                if let Some(prob) = self.derivation_prob(best.edge, &next_ranks) {
                    self.seen.get_mut(&item).unwrap().insert(key);
                    self.frontier.get_mut(&item).unwrap().push(RankedCandidate {
                        edge: best.edge,
                        ranks: next_ranks,
                        prob,
                    });
                }
            }
        }
        self.lists.get(&item).and_then(|l| l.get(k)).map(|d| d.prob)
    }

    /// Materializes the k-th derivation of `item` into an owned answer
    /// tree, allocating into `trees`.
    pub fn build_tree(
        &mut self,
        item: ItemId,
        k: usize,
        trees: &mut Arena<AnswerTree>,
    ) -> Option<AnswerTreeId> {
        self.kth(item, k)?;
        let derivation = self.lists.get(&item)?.get(k)?.clone();
        let children_items = edge_children(self.edges, derivation.edge);
        let mut children = Vec::with_capacity(children_items.len());
        for (&child_item, &rank) in children_items.iter().zip(derivation.ranks.iter()) {
            children.push(self.build_tree(child_item, rank, trees)?);
        }
        let lhs = self.items.get(item).lhs;
        let word = self.items.get(item).vocab_head();
        Some(trees.alloc(AnswerTree {
            terminal: lhs,
            word,
            children,
        }))
    }
}

/// Collapses derivations with identical (label, yield, child-labels)
/// signatures, keeping the first (best, since derivations are requested in
/// descending-probability order) occurrence.
#[derive(Default)]
pub struct UniquenessFilter {
    seen: HashSet<String>,
}

impl UniquenessFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a given signature is observed.
    pub fn admit(&mut self, tree: AnswerTreeId, trees: &Arena<AnswerTree>) -> bool {
        let mut sig = String::new();
        signature(tree, trees, &mut sig);
        self.seen.insert(sig)
    }
}

fn signature(id: AnswerTreeId, trees: &Arena<AnswerTree>, out: &mut String) {
    let node = trees.get(id);
    out.push('(');
    out.push_str(&node.terminal.to_string());
    if let Some(w) = node.word {
        out.push(':');
        out.push_str(&w.to_string());
    }
    for &child in &node.children {
        signature(child, trees, out);
    }
    out.push(')');
}
