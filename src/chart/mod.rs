//! The best-first chart parser: a CKY-style agenda of candidate
//! constituents, ranked by figure-of-merit and popped highest-first, driven
//! throughout by the smoothed model's rule probabilities.

pub mod constraints;
pub mod edge;
pub mod heap;
pub mod item;
pub mod nbest;
pub mod sentence;

use std::collections::HashMap;

use log_domain::LogDomain;
use num_traits::{One, Zero};

use crate::arena::Arena;
use crate::config::{ParserConfig, ParserRuntime};
use crate::grammar::{Grammar, HeadSide};
use crate::model::calc::{CalcClass, History};
use crate::model::unknown::{is_capitalized, is_hyphenated};
use crate::symbol::SymbolId;
use crate::vocab::{Sentence, Vocabulary, Word};

pub use constraints::{ExtPosConstraints, SpanConstraint, SpanConstraints};
pub use edge::{Edge, EdgeId, EdgeStatus};
pub use item::{Item, ItemId};
pub use nbest::{AnswerTree, AnswerTreeId, DerivationTable, UniquenessFilter};
pub use sentence::parse_tagged_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// the agenda emptied without completing any full-sentence constituent.
    ParseFailure,
    /// the edge heap reached its hard cap before any full-sentence
    /// constituent completed.
    OverflowFailure,
    /// the pop budget ran out before any full-sentence constituent
    /// completed.
    Timeout,
}

struct Seed {
    tag: SymbolId,
    prob: LogDomain<f64>,
}

/// A coarse stand-in for a head-word cluster id: known words use their own
/// vocabulary id (the finest class there is), unknown words fall back to
/// the same capitalization/hyphenation shape the unknown-word model already
/// conditions on. Negative so it never collides with a real `VocabId` cast
/// to `i64`.
fn head_word_class(word: &Word, vocab: &Vocabulary) -> i64 {
    if vocab.surface(word.vocab).is_some() {
        word.vocab as i64
    } else {
        let cap = is_capitalized(&word.surface) as i64;
        let hyph = is_hyphenated(&word.surface) as i64;
        -(1 + cap + 2 * hyph)
    }
}

/// A small multiplicative nudge, monotonic in `count`, that only matters
/// when two rules would otherwise land at exactly the same probability
/// (e.g. both at the smoothed model's floor) — `Grammar::nt_count`'s
/// documented role as a tie-breaker, not a real probability factor.
fn nt_tie_break(grammar: &Grammar, sym: SymbolId) -> LogDomain<f64> {
    LogDomain::new(1.0 + 1e-6 * grammar.nt_count(sym).max(0.0)).unwrap()
}

/// Owns every arena a single sentence's parse allocates. Reusable across
/// sentences via [`Chart::reset`] so the backing `Vec`s don't reallocate.
pub struct Chart {
    items: Arena<Item>,
    edges: Arena<Edge>,
    heap: heap::EdgeHeap,
    trees: Arena<AnswerTree>,
    cells: HashMap<(SymbolId, u32, u32), ItemId>,
    by_start: HashMap<u32, Vec<ItemId>>,
    by_finish: HashMap<u32, Vec<ItemId>>,
}

impl Default for Chart {
    fn default() -> Self {
        Chart::new()
    }
}

impl Chart {
    pub fn new() -> Self {
        Chart {
            items: Arena::new(),
            edges: Arena::new(),
            heap: heap::EdgeHeap::with_capacity(4096),
            trees: Arena::new(),
            cells: HashMap::new(),
            by_start: HashMap::new(),
            by_finish: HashMap::new(),
        }
    }

    /// Looks up a tree from a previous [`Chart::parse`]'s N-best list. Valid
    /// until the next [`Chart::reset`]/`parse` call.
    pub fn tree(&self, id: AnswerTreeId) -> &AnswerTree {
        self.trees.get(id)
    }

    pub fn reset(&mut self) {
        self.items.reset();
        self.edges.reset();
        self.heap = heap::EdgeHeap::with_capacity(4096);
        self.trees.reset();
        self.cells.clear();
        self.by_start.clear();
        self.by_finish.clear();
    }

    fn get_or_create_item(&mut self, lhs: SymbolId, start: u32, finish: u32) -> (ItemId, bool) {
        if let Some(&id) = self.cells.get(&(lhs, start, finish)) {
            (id, false)
        } else {
            let id = self.items.alloc(Item::new(lhs, start, finish));
            self.cells.insert((lhs, start, finish), id);
            self.by_start.entry(start).or_default().push(id);
            self.by_finish.entry(finish).or_default().push(id);
            (id, true)
        }
    }

    fn push_leaf(
        &mut self,
        lhs: SymbolId,
        start: u32,
        word: Word,
        prob: LogDomain<f64>,
        outside: LogDomain<f64>,
        hard_cap: usize,
    ) -> bool {
        let edge = self.edges.alloc(Edge {
            lhs,
            rhs: Vec::new(),
            dot: 0,
            start,
            pred: None,
            item: None,
            status: EdgeStatus::Finished,
            head: Some(word),
            inside: prob,
            left_merit: LogDomain::one(),
            right_merit: LogDomain::one(),
            merit: prob * outside,
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        });
        self.heap.push(&mut self.edges, edge, hard_cap)
    }

    fn push_unary(
        &mut self,
        parent: SymbolId,
        child: ItemId,
        prob: LogDomain<f64>,
        outside: LogDomain<f64>,
        hard_cap: usize,
    ) -> bool {
        let child_lhs = self.items.get(child).lhs;
        let child_inside = self.items.get(child).inside;
        let head = self.items.get(child).head.clone();
        let base = self.edges.alloc(Edge {
            lhs: parent,
            rhs: vec![child_lhs],
            dot: 0,
            start: self.items.get(child).start,
            pred: None,
            item: None,
            status: EdgeStatus::Active,
            head: None,
            inside: LogDomain::one(),
            left_merit: LogDomain::one(),
            right_merit: LogDomain::one(),
            merit: LogDomain::zero(),
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        });
        let inside = child_inside * prob;
        let finished = self.edges.alloc(Edge {
            lhs: parent,
            rhs: vec![child_lhs],
            dot: 1,
            start: self.items.get(child).start,
            pred: Some(base),
            item: Some(child),
            status: EdgeStatus::Finished,
            head,
            inside,
            left_merit: child_inside,
            right_merit: LogDomain::one(),
            merit: inside * outside,
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        });
        self.items.get_mut(child).needed_by.push(finished);
        self.heap.push(&mut self.edges, finished, hard_cap)
    }

    fn push_binary(
        &mut self,
        parent: SymbolId,
        left: ItemId,
        right: ItemId,
        side: HeadSide,
        prob: LogDomain<f64>,
        outside: LogDomain<f64>,
        hard_cap: usize,
    ) -> bool {
        let left_lhs = self.items.get(left).lhs;
        let right_lhs = self.items.get(right).lhs;
        let start = self.items.get(left).start;
        let base = self.edges.alloc(Edge {
            lhs: parent,
            rhs: vec![left_lhs, right_lhs],
            dot: 0,
            start,
            pred: None,
            item: None,
            status: EdgeStatus::Active,
            head: None,
            inside: LogDomain::one(),
            left_merit: LogDomain::one(),
            right_merit: LogDomain::one(),
            merit: LogDomain::zero(),
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        });
        let left_inside = self.items.get(left).inside;
        let left_edge = self.edges.alloc(Edge {
            lhs: parent,
            rhs: vec![left_lhs, right_lhs],
            dot: 1,
            start,
            pred: Some(base),
            item: Some(left),
            status: EdgeStatus::Active,
            head: None,
            inside: left_inside,
            left_merit: LogDomain::one(),
            right_merit: LogDomain::one(),
            merit: LogDomain::zero(),
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        });
        let right_inside = self.items.get(right).inside;
        let inside = left_inside * right_inside * prob;
        let head = match side {
            HeadSide::Left => self.items.get(left).head.clone(),
            HeadSide::Right => self.items.get(right).head.clone(),
        };
        let finished = self.edges.alloc(Edge {
            lhs: parent,
            rhs: vec![left_lhs, right_lhs],
            dot: 2,
            start,
            pred: Some(left_edge),
            item: Some(right),
            status: EdgeStatus::Finished,
            head,
            inside,
            left_merit: left_inside,
            right_merit: right_inside,
            merit: inside * outside,
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        });
        self.items.get_mut(left).needed_by.push(finished);
        self.items.get_mut(right).needed_by.push(finished);
        self.heap.push(&mut self.edges, finished, hard_cap)
    }

    /// Applies one demerit strike to `edge_id` if its recorded child
    /// snapshot predates `new_child_inside`, multiplying `merit` by
    /// `factor` (matching `Edge::merit`'s documented
    /// `demerit_factor^demerits` term) and resifting it in the heap, or
    /// evicting it outright once `demerits` reaches `bound`.
    fn demerit(&mut self, edge_id: EdgeId, new_child_inside: LogDomain<f64>, factor: f64, bound: u32) {
        let edge = self.edges.get_mut(edge_id);
        if edge.left_merit >= new_child_inside && edge.right_merit >= new_child_inside {
            return;
        }
        edge.demerits += 1;
        edge.merit = edge.merit * LogDomain::new(factor.clamp(1e-12, 1.0)).unwrap();
        if edge.demerits >= bound {
            self.heap.remove(&mut self.edges, edge_id);
        } else {
            self.heap.resift(&mut self.edges, edge_id);
        }
    }

    /// Runs the full best-first parse of `sentence`, returning up to
    /// `config.nbest` ranked, deduplicated derivations of any full-span
    /// constituent.
    pub fn parse(
        &mut self,
        sentence: &Sentence,
        runtime: &ParserRuntime,
        config: &ParserConfig,
        ext_pos: &ExtPosConstraints,
        span_constraints: &SpanConstraints,
    ) -> Result<Vec<(LogDomain<f64>, AnswerTreeId)>, ParseOutcome> {
        self.reset();
        let n = sentence.len() as u32;
        if n == 0 {
            return Err(ParseOutcome::ParseFailure);
        }

        let mut per_word_seeds: Vec<Vec<Seed>> = Vec::with_capacity(n as usize);
        let mut max_per_word = Vec::with_capacity(n as usize);
        for word in &sentence.words {
            let mut seeds = Vec::new();
            if let Some(dist) = runtime.vocab.dist(word.vocab) {
                for &(tag, p) in &dist.tag_probs {
                    if ext_pos.permits(word.position as u32, tag) {
                        seeds.push(Seed {
                            tag,
                            prob: LogDomain::new(p.max(1e-10)).unwrap(),
                        });
                    }
                }
            } else {
                let cap = is_capitalized(&word.surface);
                let hyph = is_hyphenated(&word.surface);
                for tag in runtime.symbols.preterminal_ids() {
                    if !ext_pos.permits(word.position as u32, tag) {
                        continue;
                    }
                    let p = runtime
                        .model
                        .unknown
                        .prob_tag_given_unknown(&word.surface, tag, cap, hyph);
                    seeds.push(Seed { tag, prob: p });
                }
            }
            let best = seeds
                .iter()
                .map(|s| s.prob)
                .fold(LogDomain::zero(), |acc, p| if p > acc { p } else { acc });
            max_per_word.push(best);
            per_word_seeds.push(seeds);
        }

        let mut prefix = vec![LogDomain::one(); n as usize + 1];
        for i in 0..n as usize {
            prefix[i + 1] = prefix[i] * max_per_word[i];
        }
        let mut suffix = vec![LogDomain::one(); n as usize + 1];
        for i in (0..n as usize).rev() {
            suffix[i] = suffix[i + 1] * max_per_word[i];
        }
        let outside_estimate = |start: u32, finish: u32| -> LogDomain<f64> {
            prefix[start as usize] * suffix[finish as usize]
        };

        let hard_cap = config.edge_heap_hard_cap;
        for (i, seeds) in per_word_seeds.into_iter().enumerate() {
            let start = i as u32;
            let word = &sentence.words[i];
            let hwc = head_word_class(word, &runtime.vocab);
            for seed in seeds {
                let history = History {
                    parent_category: Some(seed.tag as i64),
                    head_tag: Some(seed.tag as i64),
                    head_word_class: Some(hwc),
                    ..History::default()
                };
                let p_class = runtime.model.prob(CalcClass::Head, hwc as u32, &history);
                let p_word = runtime.model.prob(CalcClass::Main, word.vocab, &history);
                let lex_prob = seed.prob * p_class * p_word;
                if !self.push_leaf(
                    seed.tag,
                    start,
                    word.clone(),
                    lex_prob,
                    outside_estimate(start, start + 1),
                    hard_cap,
                ) {
                    return Err(ParseOutcome::OverflowFailure);
                }
            }
        }

        let mut root_items: Vec<ItemId> = Vec::new();
        let mut best_root_merit: Option<LogDomain<f64>> = None;
        let mut pops: u64 = 0;
        let overparse_factor = LogDomain::new(config.overparse_factor.max(1.0)).unwrap();

        while let Some(edge_id) = self.heap.pop(&mut self.edges) {
            pops += 1;
            if pops > config.pop_timeout && root_items.is_empty() {
                return Err(ParseOutcome::Timeout);
            }
            let edge = self.edges.get(edge_id).clone();
            if let Some(best) = best_root_merit {
                if !root_items.is_empty() && edge.merit < best / overparse_factor {
                    break;
                }
            }

            let start = edge.start;
            let finish = span_of(&self.edges, edge_id, &self.items);
            let lhs = edge.lhs;

            if !span_constraints.permits_label(start, finish, lhs) {
                continue;
            }

            let (item_id, is_new) = self.get_or_create_item(lhs, start, finish);
            let mut stale_dependents: Vec<EdgeId> = Vec::new();
            let mut new_inside = LogDomain::zero();
            {
                let item = self.items.get_mut(item_id);
                item.finishing_edges.push(edge_id);
                if edge.inside > item.inside {
                    item.inside = edge.inside;
                    item.head = edge.head.clone();
                    new_inside = item.inside;
                    stale_dependents = item.needed_by.clone();
                }
            }
            for dependent in stale_dependents {
                self.demerit(dependent, new_inside, config.demerit_factor, config.demerit_bound);
            }

            if start == 0 && finish == n {
                if !root_items.contains(&item_id) {
                    root_items.push(item_id);
                }
                best_root_merit = Some(match best_root_merit {
                    Some(m) if m >= edge.merit => m,
                    _ => edge.merit,
                });
            }

            if !is_new {
                continue;
            }

            if span_constraints.crosses_constraint(start, finish) {
                continue;
            }

            for parent in runtime.grammar.unary_parents(lhs).to_vec() {
                let history = History {
                    parent_category: Some(parent as i64),
                    head_tag: Some(lhs as i64),
                    ..History::default()
                };
                let prob = runtime.model.prob(CalcClass::Unary, parent as u32, &history)
                    * nt_tie_break(&runtime.grammar, parent);
                let outside = outside_estimate(start, finish);
                if !self.push_unary(parent, item_id, prob, outside, hard_cap) {
                    if root_items.is_empty() {
                        return Err(ParseOutcome::OverflowFailure);
                    }
                }
            }

            for &left in self.by_finish.get(&start).cloned().unwrap_or_default().iter() {
                let left_lhs = self.items.get(left).lhs;
                for &(parent, side) in runtime.grammar.binary_parents(left_lhs, lhs).to_vec().iter() {
                    let head_tag = match side {
                        HeadSide::Left => left_lhs,
                        HeadSide::Right => lhs,
                    };
                    let history = History {
                        parent_category: Some(parent as i64),
                        head_tag: Some(head_tag as i64),
                        distance: Some(0),
                        ..History::default()
                    };
                    let rule_prob = runtime.model.prob(CalcClass::Rule, parent as u32, &history)
                        * nt_tie_break(&runtime.grammar, parent);
                    let (dep_calc, dep_event) = match side {
                        HeadSide::Left => (CalcClass::Right, lhs),
                        HeadSide::Right => (CalcClass::Left, left_lhs),
                    };
                    let dep_prob = runtime.model.prob(dep_calc, dep_event as u32, &history);
                    let prob = rule_prob * dep_prob;
                    let left_start = self.items.get(left).start;
                    let outside = outside_estimate(left_start, finish);
                    if !self.push_binary(parent, left, item_id, side, prob, outside, hard_cap)
                        && root_items.is_empty()
                    {
                        return Err(ParseOutcome::OverflowFailure);
                    }
                }
            }

            for &right in self.by_start.get(&finish).cloned().unwrap_or_default().iter() {
                let right_lhs = self.items.get(right).lhs;
                for &(parent, side) in runtime.grammar.binary_parents(lhs, right_lhs).to_vec().iter() {
                    let head_tag = match side {
                        HeadSide::Left => lhs,
                        HeadSide::Right => right_lhs,
                    };
                    let history = History {
                        parent_category: Some(parent as i64),
                        head_tag: Some(head_tag as i64),
                        distance: Some(0),
                        ..History::default()
                    };
                    let rule_prob = runtime.model.prob(CalcClass::Rule, parent as u32, &history)
                        * nt_tie_break(&runtime.grammar, parent);
                    let (dep_calc, dep_event) = match side {
                        HeadSide::Left => (CalcClass::Right, right_lhs),
                        HeadSide::Right => (CalcClass::Left, lhs),
                    };
                    let dep_prob = runtime.model.prob(dep_calc, dep_event as u32, &history);
                    let prob = rule_prob * dep_prob;
                    let right_finish = self.items.get(right).finish;
                    let outside = outside_estimate(start, right_finish);
                    if !self.push_binary(parent, item_id, right, side, prob, outside, hard_cap)
                        && root_items.is_empty()
                    {
                        return Err(ParseOutcome::OverflowFailure);
                    }
                }
            }
        }

        if root_items.is_empty() {
            return Err(ParseOutcome::ParseFailure);
        }

        let mut table = DerivationTable::new(&self.items, &self.edges, config.nbest_extract_budget);
        let mut filter = UniquenessFilter::new();
        let mut ranked: Vec<(LogDomain<f64>, AnswerTreeId)> = Vec::new();
        for &root in &root_items {
            let mut k = 0;
            while ranked.len() < config.nbest {
                let Some(prob) = table.kth(root, k) else { break };
                let Some(tree) = table.build_tree(root, k, &mut self.trees) else { break };
                if filter.admit(tree, &self.trees) {
                    ranked.push((prob, tree));
                }
                k += 1;
                if k > config.nbest * 4 {
                    break;
                }
            }
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.truncate(config.nbest);
        Ok(ranked)
    }
}

/// Recovers the finish position of a just-finished edge by walking its
/// `pred` chain to the rightmost consumed item (or `start + 1` for a
/// childless preterminal leaf).
fn span_of(edges: &Arena<Edge>, edge: EdgeId, items: &Arena<Item>) -> u32 {
    let e = edges.get(edge);
    match e.item {
        Some(item) => items.get(item).finish,
        None => e.start + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::model::SmoothedModel;
    use crate::symbol::SymbolTable;
    use crate::vocab::{Vocabulary, Word};
    use std::path::Path;

    fn toy_runtime() -> ParserRuntime {
        let symbols = SymbolTable::parse("NN 1\nNP 0\n", Path::new("terms.txt")).unwrap();
        let nn = symbols.id_of("NN").unwrap();
        let np = symbols.id_of("NP").unwrap();
        ParserRuntime {
            symbols,
            model: SmoothedModel::test_stub(),
            vocab: Vocabulary::default(),
            grammar: Grammar::for_test("", &format!("{np} {nn} {nn} R\n")),
        }
    }

    #[test]
    fn single_token_sentence_parses() {
        let runtime = toy_runtime();
        let sentence = Sentence {
            words: vec![Word {
                surface: "cat".into(),
                position: 0,
                vocab: 0,
            }],
            name: None,
        };
        let config = ParserConfig::default();
        let mut chart = Chart::new();
        let result = chart
            .parse(
                &sentence,
                &runtime,
                &config,
                &ExtPosConstraints::new(),
                &SpanConstraints::new(1),
            )
            .expect("a single tagged token should always yield a full-span parse");
        assert!(!result.is_empty());
    }

    #[test]
    fn empty_sentence_fails() {
        let runtime = toy_runtime();
        let sentence = Sentence::default();
        let config = ParserConfig::default();
        let mut chart = Chart::new();
        let result = chart.parse(
            &sentence,
            &runtime,
            &config,
            &ExtPosConstraints::new(),
            &SpanConstraints::new(1),
        );
        assert_eq!(result, Err(ParseOutcome::ParseFailure));
    }
}
