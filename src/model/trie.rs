//! The smoothed-model feature tree: a trie of feature histories. Each
//! node's leaf array (conditioned-event -> training count) and child array
//! (conditioning value -> child node) are kept sorted by key so lookups are
//! binary searches. Cross-references between nodes are arena indices rather
//! than raw pointers.

use crate::arena::{Arena, Id};
use nom::{
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0, space0, space1},
    combinator::{map_res, opt, recognize},
    multi::separated_list0,
    sequence::{pair, preceded, tuple},
    IResult,
};

pub type NodeId = Id<TrieNode>;

#[derive(Debug, Clone)]
pub struct TrieNode {
    pub parent: Option<NodeId>,
    pub aux: Option<NodeId>,
    /// total training count observed at this node, used to pick the
    /// smoothing bucket.
    pub count: f64,
    /// sorted by event id.
    pub leaves: Vec<(u32, f64)>,
    /// sorted by conditioning value.
    pub children: Vec<(i64, NodeId)>,
}

impl TrieNode {
    fn empty(parent: Option<NodeId>) -> Self {
        TrieNode {
            parent,
            aux: None,
            count: 0.0,
            leaves: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn leaf_count(&self, event: u32) -> Option<f64> {
        self.leaves
            .binary_search_by_key(&event, |&(e, _)| e)
            .ok()
            .map(|i| self.leaves[i].1)
    }

    pub fn child(&self, key: i64) -> Option<NodeId> {
        self.children
            .binary_search_by_key(&key, |&(k, _)| k)
            .ok()
            .map(|i| self.children[i].1)
    }

    /// Maximum-likelihood estimate of `event` at this node alone:
    /// `count(event) / total`. Zero when the node has no observations.
    pub fn mle(&self, event: u32) -> f64 {
        if self.count <= 0.0 {
            return 0.0;
        }
        self.leaf_count(event).unwrap_or(0.0) / self.count
    }

    #[cfg(test)]
    fn debug_assert_sorted(&self) {
        debug_assert!(self.leaves.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(self.children.windows(2).all(|w| w[0].0 < w[1].0));
    }
}

#[derive(Debug, Clone)]
pub struct FeatureTree {
    arena: Arena<TrieNode>,
    root: NodeId,
}

impl Default for FeatureTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(TrieNode::empty(None));
        FeatureTree { arena, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TrieNode {
        self.arena.get(id)
    }

    /// Inserts (or walks to) the node reached from `root` by following
    /// `path`, creating children as needed, keeping each level's child
    /// array sorted.
    pub fn insert_path(&mut self, path: &[i64]) -> NodeId {
        let mut cur = self.root;
        for &key in path {
            cur = match self.arena.get(cur).child(key) {
                Some(child) => child,
                None => {
                    let child = self.arena.alloc(TrieNode::empty(Some(cur)));
                    let node = self.arena.get_mut(cur);
                    let pos = node
                        .children
                        .binary_search_by_key(&key, |&(k, _)| k)
                        .unwrap_err();
                    node.children.insert(pos, (key, child));
                    child
                }
            };
        }
        cur
    }

    pub fn set_leaves(&mut self, node: NodeId, mut leaves: Vec<(u32, f64)>) {
        leaves.sort_by_key(|&(e, _)| e);
        let total: f64 = leaves.iter().map(|&(_, c)| c).sum();
        let node = self.arena.get_mut(node);
        node.leaves = leaves;
        node.count = total;
    }

    /// Parses the simple text grammar used for `<calc-name>.g` files:
    /// one line per trie node, `key1,key2,...|count|event=count event=count ...`
    /// (empty key list for the root). Lines are free to arrive in any
    /// order; ancestors are created on demand.
    pub fn parse(text: &str) -> Result<FeatureTree, String> {
        let mut tree = FeatureTree::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (_, (path, leaves)) =
                parse_line(line).map_err(|e| format!("line {lineno}: {e}"))?;
            let node = tree.insert_path(&path);
            tree.set_leaves(node, leaves);
        }
        Ok(tree)
    }
}

fn parse_i64(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse)(input)
}

fn parse_u32(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

fn parse_f64(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1))))),
        str::parse,
    )(input)
}

fn parse_path(input: &str) -> IResult<&str, Vec<i64>> {
    separated_list0(char(','), parse_i64)(input)
}

fn parse_event_count(input: &str) -> IResult<&str, (u32, f64)> {
    let (input, event) = parse_u32(input)?;
    let (input, _) = char('=')(input)?;
    let (input, count) = parse_f64(input)?;
    Ok((input, (event, count)))
}

fn parse_line(input: &str) -> IResult<&str, (Vec<i64>, Vec<(u32, f64)>)> {
    let (input, path) = parse_path(input)?;
    let (input, _) = preceded(space0, char('|'))(input)?;
    let (input, _count) = preceded(space0, parse_f64)(input)?;
    let (input, _) = preceded(space0, char('|'))(input)?;
    let (input, leaves) = preceded(
        multispace0,
        separated_list0(space1, parse_event_count),
    )(input)?;
    Ok((input, (path, leaves)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_backs_off() {
        let text = "\n\
            |0|3=2 4=1\n\
            5|3|3=1 4=2\n\
        ";
        let tree = FeatureTree::parse(text).unwrap();
        let root = tree.node(tree.root());
        root.debug_assert_sorted();
        assert_eq!(root.mle(3), 2.0 / 3.0);

        let child = tree.node(tree.root()).child(5).unwrap();
        let child_node = tree.node(child);
        assert_eq!(child_node.mle(4), 2.0 / 3.0);
        assert_eq!(tree.node(tree.root()).child(99), None);
    }
}
