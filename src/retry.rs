//! Guided-parsing retry: when a parse constrained by an external span set
//! fails, relax the constraint set by raising the minimum constrained-span
//! length (so short constraints stop being enforced) and try once more,
//! rather than giving up outright. Mirrors the `evalTree` driver's retry
//! policy of raising the minimum size from 1 to 2.

use log::debug;
use log_domain::LogDomain;

use crate::chart::{AnswerTreeId, Chart, ExtPosConstraints, ParseOutcome, SpanConstraint, SpanConstraints};
use crate::config::{ParserConfig, ParserRuntime};
use crate::vocab::Sentence;

/// `spans` is the full constraint set as supplied by the caller; this
/// applies it first at `config.span_min_length`, then at
/// `config.span_min_length + 1` if the first attempt comes back
/// `ParseFailure`. Any other failure is returned immediately, unretried.
pub fn parse_guided(
    chart: &mut Chart,
    sentence: &Sentence,
    runtime: &ParserRuntime,
    config: &ParserConfig,
    ext_pos: &ExtPosConstraints,
    spans: &[SpanConstraint],
) -> Result<Vec<(LogDomain<f64>, AnswerTreeId)>, ParseOutcome> {
    let mut min_length = config.span_min_length.max(1);
    loop {
        let mut constraints = SpanConstraints::new(min_length);
        for &c in spans {
            constraints.push(c);
        }
        match chart.parse(sentence, runtime, config, ext_pos, &constraints) {
            Ok(ranked) => return Ok(ranked),
            Err(ParseOutcome::ParseFailure) if min_length < 2 => {
                debug!(
                    "guided parse failed at span minimum {min_length}, retrying at {}",
                    min_length + 1
                );
                min_length += 1;
            }
            Err(outcome) => return Err(outcome),
        }
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
    fn retries_once_when_a_short_constraint_blocks_the_parse() {
        let runtime = toy_runtime();
        let nn = runtime.symbols.id_of("NN").unwrap();
        let sentence = Sentence {
            words: vec![Word { surface: "cat".into(), position: 0, vocab: 0 }],
            name: None,
        };
        let mut config = ParserConfig::default();
        config.span_min_length = 1;
        let mut chart = Chart::new();
        // a bogus single-token span labeled with a tag that can never match
        // blocks the parse at min_length 1 but is dropped at min_length 2.
        let spans = vec![SpanConstraint { start: 0, end: 1, label: nn + 1 }];
        let result = parse_guided(&mut chart, &sentence, &runtime, &config, &ExtPosConstraints::new(), &spans);
        assert!(result.is_ok());
    }
}
