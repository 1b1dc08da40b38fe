//! The fixed nonterminal/terminal inventory, loaded once from `terms.txt`
//! and never mutated afterwards. Integerisation is explicit and
//! one-directional (name -> id, id -> name) since the inventory is read
//! straight from a file rather than discovered incrementally while
//! building transitions.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Small integer id, kept under 200 or so in practice.
pub type SymbolId = u16;

pub const START_SYMBOL: SymbolId = 0;
pub const STOP_SYMBOL: SymbolId = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermClass {
    Nonterminal,
    PreterminalClosed,
    PreterminalOpen,
    Punctuation,
    Comma,
    Colon,
    Final,
    Paren,
}

impl TermClass {
    fn from_code(code: u32) -> Option<TermClass> {
        use TermClass::*;
        Some(match code {
            0 => Nonterminal,
            1 => PreterminalClosed,
            2 => PreterminalOpen,
            3 => Punctuation,
            4 => Comma,
            5 => Colon,
            6 => Final,
            7 => Paren,
            _ => return None,
        })
    }

    pub fn is_preterminal(self) -> bool {
        matches!(self, TermClass::PreterminalOpen | TermClass::PreterminalClosed)
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub class: TermClass,
}

/// The immutable symbol inventory. Ids are assigned in file order, so the
/// two sentinels occupy ids 0 and 1 by construction (the loader inserts them
/// first if `terms.txt` does not declare them explicitly).
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn load(path: &Path) -> Result<SymbolTable, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| {
            ConfigError::MissingFile(path.to_path_buf())
        })?;
        Self::parse(&text, path)
    }

    pub(crate) fn parse(text: &str, path: &Path) -> Result<SymbolTable, ConfigError> {
        let mut symbols = Vec::new();
        let mut by_name = HashMap::new();

        let mut push = |name: &str, class: TermClass, symbols: &mut Vec<Symbol>, by_name: &mut HashMap<String, SymbolId>| {
            let id = symbols.len() as SymbolId;
            by_name.entry(name.to_string()).or_insert(id);
            symbols.push(Symbol { name: name.to_string(), class });
        };

        push("*START*", TermClass::Nonterminal, &mut symbols, &mut by_name);
        push("*STOP*", TermClass::Nonterminal, &mut symbols, &mut by_name);

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let name = parts.next().ok_or_else(|| ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("line {lineno}: missing name"),
            })?;
            let code: u32 = parts
                .next()
                .ok_or_else(|| ConfigError::CorruptFile {
                    path: path.to_path_buf(),
                    reason: format!("line {lineno}: missing class"),
                })?
                .parse()
                .map_err(|_| ConfigError::CorruptFile {
                    path: path.to_path_buf(),
                    reason: format!("line {lineno}: class is not an integer"),
                })?;
            let class = TermClass::from_code(code).ok_or_else(|| ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("line {lineno}: unknown class code {code}"),
            })?;
            if by_name.contains_key(name) {
                continue;
            }
            push(name, class, &mut symbols, &mut by_name);
        }

        if symbols.len() > 400 {
            return Err(ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("{} symbols exceeds the small-id budget", symbols.len()),
            });
        }

        Ok(SymbolTable { symbols, by_name })
    }

    pub fn id_of(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id as usize]
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.symbol(id).name
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn preterminal_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len() as SymbolId).filter(move |&id| self.symbol(id).class.is_preterminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terms_file() {
        let text = "S1 0\nNP 0\nNN 1\n, 4\n";
        let table = SymbolTable::parse(text, Path::new("terms.txt")).unwrap();
        assert_eq!(table.id_of("S1"), Some(2));
        assert_eq!(table.id_of("NN").map(|id| table.symbol(id).class.is_preterminal()), Some(true));
        assert_eq!(table.id_of("*START*"), Some(START_SYMBOL));
        assert_eq!(table.id_of("*STOP*"), Some(STOP_SYMBOL));
    }

    #[test]
    fn rejects_unknown_class() {
        let text = "NP 99\n";
        assert!(SymbolTable::parse(text, Path::new("terms.txt")).is_err());
    }
}
