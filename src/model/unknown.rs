//! Unknown-word probabilities: a suffix table, a capitalization factor, and
//! a hyphenation factor, all conditioned on the preterminal tag. Built from
//! `pUgT.txt` (`<tag> P(unk|tag) P(Cap|tag) P(hyphen|tag,unk)`) and
//! `endings.txt` (suffix -> per-tag factor) in the model directory.

use crate::error::ConfigError;
use crate::symbol::SymbolId;
use log_domain::LogDomain;
use num_traits::{One, Zero};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct TagUnkStats {
    pub p_unk: f64,
    pub p_cap: f64,
    pub p_hyphen: f64,
}

/// A reversed-suffix trie: walking it character-by-character from the end
/// of the word finds the longest suffix on record, the same back-off
/// principle the trie in `model::trie` applies to sub-features.
#[derive(Debug, Clone, Default)]
struct SuffixNode {
    children: HashMap<char, Box<SuffixNode>>,
    per_tag_factor: HashMap<SymbolId, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UnknownWordModel {
    per_tag: HashMap<SymbolId, TagUnkStats>,
    suffixes: SuffixNode,
}

impl UnknownWordModel {
    pub fn load(pugt_path: &Path, endings_path: &Path) -> Result<UnknownWordModel, ConfigError> {
        let pugt_text = std::fs::read_to_string(pugt_path)
            .map_err(|_| ConfigError::MissingFile(pugt_path.to_path_buf()))?;
        let endings_text = std::fs::read_to_string(endings_path)
            .map_err(|_| ConfigError::MissingFile(endings_path.to_path_buf()))?;
        Self::parse(&pugt_text, &endings_text, pugt_path)
    }

    fn parse(
        pugt_text: &str,
        endings_text: &str,
        path_for_errors: &Path,
    ) -> Result<UnknownWordModel, ConfigError> {
        let mut per_tag = HashMap::new();
        for (lineno, line) in pugt_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let bad = || ConfigError::CorruptFile {
                path: path_for_errors.to_path_buf(),
                reason: format!("pUgT.txt line {lineno}: malformed"),
            };
            let tag: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let p_unk: f64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let p_cap: f64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let p_hyphen: f64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            per_tag.insert(tag, TagUnkStats { p_unk, p_cap, p_hyphen });
        }

        let mut suffixes = SuffixNode::default();
        for (lineno, line) in endings_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let bad = || ConfigError::CorruptFile {
                path: path_for_errors.to_path_buf(),
                reason: format!("endings.txt line {lineno}: malformed"),
            };
            let suffix = fields.next().ok_or_else(bad)?;
            let tag: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let factor: f64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let mut node = &mut suffixes;
            for c in suffix.chars().rev() {
                node = node.children.entry(c).or_default();
            }
            node.per_tag_factor.insert(tag, factor);
        }

        Ok(UnknownWordModel { per_tag, suffixes })
    }

    fn suffix_factor(&self, word: &str, tag: SymbolId) -> f64 {
        let mut node = &self.suffixes;
        let mut best = node.per_tag_factor.get(&tag).copied();
        for c in word.chars().rev() {
            match node.children.get(&c) {
                Some(next) => {
                    node = next;
                    if let Some(&f) = node.per_tag_factor.get(&tag) {
                        best = Some(f);
                    }
                }
                None => break,
            }
        }
        best.unwrap_or(1e-6)
    }

    /// `p(tag | unknown word)` composed from the suffix table, a
    /// capitalization factor, and a hyphenation factor, all conditioned on
    /// `tag`.
    pub fn prob_tag_given_unknown(
        &self,
        word: &str,
        tag: SymbolId,
        is_capitalized: bool,
        is_hyphenated: bool,
    ) -> LogDomain<f64> {
        let stats = self.per_tag.get(&tag).copied().unwrap_or_default();
        let cap_factor = if is_capitalized { stats.p_cap } else { 1.0 - stats.p_cap };
        let hyphen_factor = if is_hyphenated { stats.p_hyphen } else { 1.0 - stats.p_hyphen };
        let suffix_factor = self.suffix_factor(word, tag);
        let p = (stats.p_unk * cap_factor.max(1e-8) * hyphen_factor.max(1e-8) * suffix_factor)
            .clamp(1e-10, 1.0);
        LogDomain::new(p).unwrap_or_else(|_| LogDomain::new(1e-10).unwrap())
    }
}

pub fn is_hyphenated(word: &str) -> bool {
    word.contains('-')
}

pub fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_suffix_wins() {
        let pugt = "5 0.1 0.3 0.05\n";
        let endings = "ing 5 0.9\ning 5 0.9\nxing 5 0.95\n";
        let model = UnknownWordModel::parse(pugt, endings, Path::new("pUgT.txt")).unwrap();
        assert_eq!(model.suffix_factor("boxing", 5), 0.95);
        assert_eq!(model.suffix_factor("running", 5), 0.9);
    }

    #[test]
    fn prob_is_in_unit_interval() {
        let pugt = "5 0.1 0.3 0.05\n";
        let endings = "ing 5 0.9\n";
        let model = UnknownWordModel::parse(pugt, endings, Path::new("pUgT.txt")).unwrap();
        let p = model.prob_tag_given_unknown("Boxing", 5, true, false);
        assert!(p > LogDomain::zero());
        assert!(p <= LogDomain::one());
    }
}
