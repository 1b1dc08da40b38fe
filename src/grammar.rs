//! Structural grammar tables: which unary and binary rule expansions exist
//! at all (`nttCounts.txt`, `unitRules.txt`), and which child is the
//! syntactic head of a binary rule (`headInfo.txt`). These are the fixed
//! rule skeletons the smoothed model scores; they answer "is this
//! expansion legal" while `model::SmoothedModel` answers "how probable".

use crate::error::ConfigError;
use crate::symbol::SymbolId;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Default)]
pub struct Grammar {
    /// child -> parents reachable by a single unary expansion.
    unary: HashMap<SymbolId, Vec<SymbolId>>,
    /// (left child, right child) -> (parent, head side).
    binary: HashMap<(SymbolId, SymbolId), Vec<(SymbolId, HeadSide)>>,
    /// raw nonterminal occurrence counts, consulted only as a smoothing
    /// tie-breaker when two rules are otherwise equally probable.
    nt_counts: HashMap<SymbolId, f64>,
}

impl Grammar {
    pub fn load(dir: &Path) -> Result<Grammar, ConfigError> {
        let unit_rules = std::fs::read_to_string(dir.join("unitRules.txt"))
            .map_err(|_| ConfigError::MissingFile(dir.join("unitRules.txt")))?;
        let head_info = std::fs::read_to_string(dir.join("headInfo.txt"))
            .map_err(|_| ConfigError::MissingFile(dir.join("headInfo.txt")))?;
        let nt_counts_text = std::fs::read_to_string(dir.join("nttCounts.txt"))
            .map_err(|_| ConfigError::MissingFile(dir.join("nttCounts.txt")))?;
        Self::parse(&unit_rules, &head_info, &nt_counts_text, dir)
    }

    fn parse(
        unit_rules: &str,
        head_info: &str,
        nt_counts: &str,
        dir: &Path,
    ) -> Result<Grammar, ConfigError> {
        let mut unary: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();
        for (lineno, line) in unit_rules.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let bad = || ConfigError::CorruptFile {
                path: dir.join("unitRules.txt"),
                reason: format!("line {lineno}: expected '<parent> <child>'"),
            };
            let parent: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let child: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            unary.entry(child).or_default().push(parent);
        }

        let mut binary: HashMap<(SymbolId, SymbolId), Vec<(SymbolId, HeadSide)>> = HashMap::new();
        for (lineno, line) in head_info.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let bad = || ConfigError::CorruptFile {
                path: dir.join("headInfo.txt"),
                reason: format!("line {lineno}: expected '<parent> <left> <right> <head-side>'"),
            };
            let parent: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let left: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let right: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let side = match fields.next().ok_or_else(bad)? {
                "L" | "0" => HeadSide::Left,
                "R" | "1" => HeadSide::Right,
                _ => return Err(bad()),
            };
            binary.entry((left, right)).or_default().push((parent, side));
        }

        let mut counts = HashMap::new();
        for (lineno, line) in nt_counts.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let bad = || ConfigError::CorruptFile {
                path: dir.join("nttCounts.txt"),
                reason: format!("line {lineno}: expected '<symbol> <count>'"),
            };
            let sym: SymbolId = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let count: f64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            counts.insert(sym, count);
        }

        Ok(Grammar {
            unary,
            binary,
            nt_counts: counts,
        })
    }

    pub fn unary_parents(&self, child: SymbolId) -> &[SymbolId] {
        self.unary.get(&child).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn binary_parents(&self, left: SymbolId, right: SymbolId) -> &[(SymbolId, HeadSide)] {
        self.binary
            .get(&(left, right))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn nt_count(&self, sym: SymbolId) -> f64 {
        self.nt_counts.get(&sym).copied().unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn for_test(unit_rules: &str, head_info: &str) -> Grammar {
        Grammar::parse(unit_rules, head_info, "", Path::new(".")).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unary_and_binary_tables() {
        let unit = "2 3\n2 4\n";
        let head = "5 1 2 R\n6 2 1 L\n";
        let counts = "1 10\n2 20\n";
        let grammar = Grammar::parse(unit, head, counts, Path::new(".")).unwrap();
        assert_eq!(grammar.unary_parents(3), &[2]);
        assert_eq!(grammar.unary_parents(4), &[2]);
        assert_eq!(grammar.binary_parents(1, 2), &[(5, HeadSide::Right)]);
        assert_eq!(grammar.nt_count(2), 20.0);
    }

    #[test]
    fn rejects_unknown_head_side() {
        assert!(Grammar::parse("", "5 1 2 X\n", "", Path::new(".")).is_err());
    }
}
