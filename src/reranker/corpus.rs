//! The reranker training corpus format: one block per sentence (`G=...
//! N=...`), followed by `N` parse lines (`P=... W=... <feature>[=<count>]
//! ... ,`). `.gz`/`.bz2` extensions are read transparently.
//!
//! The file never states which parse is "correct" or what weight a
//! sentence carries; those are derived here from `G`/`P`/`W` via
//! expected F-score, with the highest-F parse (ties broken by feature 0's
//! count, conventionally the first-stage log probability) taken as correct
//! and given probability mass 1.

use std::io::Read as _;
use std::path::Path;

use nom::{
    bytes::complete::tag,
    character::complete::{char, digit1, space0, space1},
    combinator::{map_res, opt, recognize},
    multi::separated_list0,
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::error::InputError;

#[derive(Debug, Clone, Default)]
pub struct RerankParse {
    /// feature id -> count (defaults to 1.0 when the file omits `=<c>`).
    pub features: Vec<(u32, f64)>,
    pub p_edges: f64,
    pub w_correct: f64,
    /// target probability mass this parse is assigned by the corpus
    /// loader's F-score tie-break, not the file itself.
    pub pyx: f64,
}

impl RerankParse {
    pub fn f_score(&self, gold_edges: f64) -> f64 {
        let denom = self.p_edges + gold_edges;
        if denom <= 0.0 {
            0.0
        } else {
            2.0 * self.w_correct / denom
        }
    }

    pub fn feature_zero(&self) -> f64 {
        self.features
            .iter()
            .find(|&&(id, _)| id == 0)
            .map(|&(_, c)| c)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RerankSentence {
    pub gold_edges: f64,
    /// 0 when the sentence should be ignored by every loss (no parse is
    /// distinguishably correct).
    pub px: f64,
    pub correct_index: usize,
    pub parses: Vec<RerankParse>,
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub sentences: Vec<RerankSentence>,
    pub nfeatures: usize,
    pub maxnparses: usize,
}

impl Corpus {
    pub fn load(path: &Path) -> Result<Corpus, InputError> {
        let raw = std::fs::read(path)?;
        let text = decompress(path, raw)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Corpus, InputError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let declared: Option<usize> = lines
            .clone()
            .next()
            .and_then(|l| parse_s_header(l).ok())
            .map(|(_, n)| n as usize);
        if declared.is_some() {
            lines.next();
        }

        let mut sentences = Vec::new();
        let mut nfeatures = 0usize;
        let mut maxnparses = 0usize;
        let mut sentence_index = 0usize;

        let mut rest = lines;
        while let Some(header) = rest.next() {
            let (_, (gold_edges, nparses)) =
                parse_gn_line(header).map_err(|_| InputError::MalformedCorpus {
                    sentence: sentence_index,
                    reason: format!("expected 'G=... N=...', got {header:?}"),
                })?;

            let mut parses = Vec::with_capacity(nparses as usize);
            for _ in 0..nparses {
                let line = rest.next().ok_or_else(|| InputError::MalformedCorpus {
                    sentence: sentence_index,
                    reason: "corpus ended mid-sentence".into(),
                })?;
                let (_, (p, w, features)) =
                    parse_pw_line(line).map_err(|_| InputError::MalformedCorpus {
                        sentence: sentence_index,
                        reason: format!("malformed parse line {line:?}"),
                    })?;
                for &(id, _) in &features {
                    nfeatures = nfeatures.max(id as usize + 1);
                }
                parses.push(RerankParse {
                    features,
                    p_edges: p,
                    w_correct: w,
                    pyx: 0.0,
                });
            }

            maxnparses = maxnparses.max(parses.len());
            let px = if parses.is_empty() { 0.0 } else { 1.0 };
            let correct_index = best_index(&parses, gold_edges);
            if let Some(best) = parses.get_mut(correct_index) {
                best.pyx = 1.0;
            }

            sentences.push(RerankSentence {
                gold_edges,
                px,
                correct_index,
                parses,
            });
            sentence_index += 1;
        }

        if let Some(declared) = declared {
            if declared != sentences.len() {
                return Err(InputError::MalformedCorpus {
                    sentence: sentences.len(),
                    reason: format!(
                        "header declared {declared} sentences, found {}",
                        sentences.len()
                    ),
                });
            }
        }

        Ok(Corpus {
            sentences,
            nfeatures,
            maxnparses,
        })
    }
}

/// Picks the highest-F parse; ties go to the higher feature-0 value, the
/// conventional first-stage log probability.
fn best_index(parses: &[RerankParse], gold_edges: f64) -> usize {
    let mut best = 0usize;
    let mut best_f = f64::NEG_INFINITY;
    let mut best_f0 = f64::NEG_INFINITY;
    for (i, parse) in parses.iter().enumerate() {
        let f = parse.f_score(gold_edges);
        let f0 = parse.feature_zero();
        if f > best_f || (f == best_f && f0 > best_f0) {
            best = i;
            best_f = f;
            best_f0 = f0;
        }
    }
    best
}

fn decompress(path: &Path, raw: Vec<u8>) -> Result<String, InputError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "gz" => {
            let mut out = String::new();
            flate2::read::GzDecoder::new(&raw[..]).read_to_string(&mut out)?;
            Ok(out)
        }
        "bz2" => {
            let mut out = String::new();
            bzip2::read::BzDecoder::new(&raw[..]).read_to_string(&mut out)?;
            Ok(out)
        }
        _ => String::from_utf8(raw)
            .map_err(|e| InputError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))),
    }
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

fn parse_s_header(input: &str) -> IResult<&str, u32> {
    preceded(tag("S="), parse_u32)(input)
}

fn parse_gn_line(input: &str) -> IResult<&str, (f64, u32)> {
    let (input, g) = opt(preceded(tag("G="), parse_f64))(input)?;
    let (input, _) = space0(input)?;
    let (input, n) = preceded(tag("N="), parse_u32)(input)?;
    Ok((input, (g.unwrap_or(1.0), n)))
}

fn parse_feature(input: &str) -> IResult<&str, (u32, f64)> {
    let (input, id) = parse_u32(input)?;
    let (input, count) = opt(preceded(char('='), parse_f64))(input)?;
    Ok((input, (id, count.unwrap_or(1.0))))
}

fn parse_pw_line(input: &str) -> IResult<&str, (f64, f64, Vec<(u32, f64)>)> {
    let (input, p) = opt(preceded(tag("P="), parse_f64))(input)?;
    let (input, _) = space0(input)?;
    let (input, w) = opt(preceded(tag("W="), parse_f64))(input)?;
    let (input, _) = space0(input)?;
    let (input, features) = separated_list0(space1, parse_feature)(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = opt(char(','))(input)?;
    Ok((input, (p.unwrap_or(1.0), w.unwrap_or(0.0), features)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_corpus() {
        let text = "\
            S=1\n\
            G=2 N=2\n\
            P=2 W=1 0=1.5 3 ,\n\
            P=2 W=2 0=0.9 3 4 ,\n\
        ";
        let corpus = Corpus::parse(text).unwrap();
        assert_eq!(corpus.sentences.len(), 1);
        let sentence = &corpus.sentences[0];
        assert_eq!(sentence.gold_edges, 2.0);
        assert_eq!(sentence.parses.len(), 2);
        // second parse has higher F (2*2/(2+2)=1.0 vs 2*1/(2+2)=0.5).
        assert_eq!(sentence.correct_index, 1);
        assert_eq!(sentence.parses[1].pyx, 1.0);
        assert_eq!(sentence.parses[0].pyx, 0.0);
        assert_eq!(corpus.nfeatures, 5);
    }

    #[test]
    fn defaults_g_to_one_and_feature_count_to_one() {
        let text = "N=1\nP=1 W=1 7 ,\n";
        let corpus = Corpus::parse(text).unwrap();
        assert_eq!(corpus.sentences[0].gold_edges, 1.0);
        assert_eq!(corpus.sentences[0].parses[0].features, vec![(7, 1.0)]);
    }

    #[test]
    fn rejects_truncated_sentence() {
        let text = "G=1 N=2\nP=1 W=1 0 ,\n";
        assert!(Corpus::parse(text).is_err());
    }

    #[test]
    fn rejects_header_count_mismatch() {
        let text = "S=2\nG=1 N=1\nP=1 W=1 0 ,\n";
        assert!(Corpus::parse(text).is_err());
    }
}
