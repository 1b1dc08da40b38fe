//! Sentence input parsing. Tokenization and PTB-escape handling are out of
//! scope (an external collaborator); this module only recognizes the two
//! input shapes the chart parser accepts once tokens are in hand.

use crate::error::InputError;
use crate::vocab::{Sentence, Vocabulary, Word};

/// Reads one whitespace-tokenized sentence bracketed by `<s>`/`</s>`
/// sentinels, optionally `<s name="...">`. Tokens are looked up in
/// `vocab`; out-of-vocabulary tokens are resolved by the caller via the
/// thread-local OOV table, since assigning their sentinel id requires
/// per-thread state this module doesn't own. When `case_insensitive` is
/// set, vocabulary lookup (only) is done against the lowercased token; the
/// surface form recorded on the returned [`Word`] keeps its original case.
pub fn parse_tagged_line(
    line: &str,
    vocab: &Vocabulary,
    case_insensitive: bool,
    mut oov: impl FnMut(&str) -> u32,
) -> Result<Sentence, InputError> {
    let line = line.trim();
    let body = line
        .strip_prefix("<s")
        .and_then(|rest| rest.split_once('>'))
        .map(|(_, rest)| rest)
        .ok_or_else(|| InputError::MalformedSentence("missing <s> opener".into()))?;
    let body = body
        .strip_suffix("</s>")
        .ok_or_else(|| InputError::MalformedSentence("missing </s> closer".into()))?;

    let name = line
        .strip_prefix("<s")
        .and_then(|rest| rest.split_once('>'))
        .map(|(head, _)| head)
        .and_then(|head| head.split_once("name="))
        .map(|(_, rest)| rest.trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty());

    let mut words = Vec::new();
    for (position, token) in body.split_whitespace().enumerate() {
        let lookup_key = if case_insensitive {
            token.to_lowercase()
        } else {
            token.to_string()
        };
        let vocab_id = vocab.lookup(&lookup_key).unwrap_or_else(|| oov(token));
        words.push(Word {
            surface: token.to_string(),
            position: position as u16,
            vocab: vocab_id,
        });
    }

    Ok(Sentence { words, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_closer() {
        let vocab = Vocabulary::default();
        let err = parse_tagged_line("<s> cat", &vocab, false, |_| 0);
        assert!(err.is_err());
    }

    #[test]
    fn parses_named_sentence() {
        let vocab = Vocabulary::default();
        let sentence = parse_tagged_line("<s name=\"t1\"> cat sat </s>", &vocab, false, |_| 999).unwrap();
        assert_eq!(sentence.name.as_deref(), Some("t1"));
        assert_eq!(sentence.len(), 2);
        assert_eq!(sentence.words[0].vocab, 999);
    }

    #[test]
    fn case_insensitive_lookup_keeps_original_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pSgT.txt");
        std::fs::write(&path, "1\ncat 5 1.0 | 3\n").unwrap();
        let vocab = Vocabulary::load(&path).unwrap();
        let sentence = parse_tagged_line("<s> Cat </s>", &vocab, true, |_| panic!("should not be OOV")).unwrap();
        assert_eq!(sentence.words[0].surface, "Cat");
        assert_eq!(sentence.words[0].vocab, vocab.lookup("cat").unwrap());
    }
}
