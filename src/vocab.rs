//! `Word`/`Sentence` and the vocabulary loader. This module is a thin
//! loader, not part of the parser's algorithmic core.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

pub type VocabId = u32;

/// Per-thread sentinel ids start here and count down, keeping them disjoint
/// from the closed dictionary's ids without requiring a shared counter.
pub const OOV_SENTINEL_BASE: VocabId = u32::MAX - 1;

#[derive(Debug, Clone)]
pub struct Word {
    pub surface: String,
    pub position: u16,
    pub vocab: VocabId,
}

#[derive(Debug, Clone, Default)]
pub struct Sentence {
    pub words: Vec<Word>,
    pub name: Option<String>,
}

impl Sentence {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One vocabulary entry: per-tag `P(tag | word)` plus the raw occurrence
/// count the original training pipeline recorded (used only for debugging /
/// the `smallCorpus` heuristic, not by the core merit computation).
#[derive(Debug, Clone, Default)]
pub struct WordTagDist {
    pub tag_probs: Vec<(crate::symbol::SymbolId, f64)>,
    pub count: f64,
}

/// The closed, global vocabulary (`pSgT.txt`). Out-of-vocabulary lookups
/// fall back to [`crate::model::unknown`]'s suffix/capitalization/hyphen
/// model, which is consulted directly from the merit computation, unlike
/// this dictionary lookup.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    ids: HashMap<String, VocabId>,
    words: Vec<String>,
    dists: Vec<WordTagDist>,
}

impl Vocabulary {
    pub fn load(path: &Path) -> Result<Vocabulary, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::MissingFile(path.to_path_buf()))?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Vocabulary, ConfigError> {
        let mut lines = text.lines();
        let count: usize = lines
            .next()
            .ok_or_else(|| ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: "empty pSgT.txt".into(),
            })?
            .trim()
            .parse()
            .map_err(|_| ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: "first line is not a count".into(),
            })?;

        let mut vocab = Vocabulary {
            ids: HashMap::with_capacity(count),
            words: Vec::with_capacity(count),
            dists: Vec::with_capacity(count),
        };

        for (i, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('|');
            let head = fields.next().ok_or_else(|| ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("entry {i}: empty line"),
            })?;
            let tail = fields.next();

            let mut tok = head.split_whitespace();
            let word = tok.next().ok_or_else(|| ConfigError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("entry {i}: missing word"),
            })?;

            let mut tag_probs = Vec::new();
            let rest: Vec<&str> = tok.collect();
            for pair in rest.chunks(2) {
                if pair.len() != 2 {
                    break;
                }
                let tag: u16 = pair[0].parse().map_err(|_| ConfigError::CorruptFile {
                    path: path.to_path_buf(),
                    reason: format!("entry {i}: bad tag id"),
                })?;
                let p: f64 = pair[1].parse().map_err(|_| ConfigError::CorruptFile {
                    path: path.to_path_buf(),
                    reason: format!("entry {i}: bad probability"),
                })?;
                tag_probs.push((tag, p));
            }
            let count = tail
                .and_then(|c| c.trim().parse::<f64>().ok())
                .unwrap_or(0.0);

            let id = vocab.words.len() as VocabId;
            vocab.ids.insert(word.to_string(), id);
            vocab.words.push(word.to_string());
            vocab.dists.push(WordTagDist { tag_probs, count });
        }

        Ok(vocab)
    }

    pub fn lookup(&self, surface: &str) -> Option<VocabId> {
        self.ids.get(surface).copied()
    }

    pub fn dist(&self, id: VocabId) -> Option<&WordTagDist> {
        self.dists.get(id as usize)
    }

    pub fn surface(&self, id: VocabId) -> Option<&str> {
        self.words.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_psgt() {
        let text = "2\ncat 5 0.9 7 0.1 | 12\ndog 5 1.0 | 3\n";
        let vocab = Vocabulary::parse(text, Path::new("pSgT.txt")).unwrap();
        assert_eq!(vocab.len(), 2);
        let id = vocab.lookup("cat").unwrap();
        let dist = vocab.dist(id).unwrap();
        assert_eq!(dist.tag_probs, vec![(5, 0.9), (7, 0.1)]);
        assert_eq!(dist.count, 12.0);
    }
}
