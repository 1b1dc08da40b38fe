//! The first-stage parser CLI: loads a model directory once, then reads
//! whitespace-tokenized, `<s>`/`</s>`-bracketed sentences from stdin and
//! writes one N-best block per line to stdout.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use log::{error, warn};
use statrank::chart::{self, AnswerTreeId, Chart, ExtPosConstraints, ParseOutcome, SpanConstraints};
use statrank::config::{Lang, ParserConfig, ParserRuntime};
use statrank::error::{ConfigError, StatrankError};
use statrank::grammar::Grammar;
use statrank::model::SmoothedModel;
use statrank::retry;
use statrank::symbol::SymbolTable;
use statrank::thread_pool::ThreadSlotPool;
use statrank::vocab::{Vocabulary, Word};

/// Best-first constituency parser over a smoothed conditional rule model.
#[derive(Parser, Debug)]
#[command(name = "parse")]
struct Args {
    /// number of derivations to return per sentence
    #[arg(short = 'N', long = "nbest", default_value_t = 50)]
    nbest: usize,

    /// overparsing factor: keep popping until merit drops below
    /// best_root_merit / factor
    #[arg(short = 'T', long = "overparse", default_value_t = 1.5)]
    overparse: f64,

    /// reject sentences longer than this many tokens
    #[arg(short = 'l', long = "maxlen", default_value_t = 400)]
    maxlen: usize,

    /// language-specific unknown-word handling
    #[arg(short = 'L', long = "lang", default_value = "En")]
    lang: Lang,

    /// case-insensitive vocabulary lookup
    #[arg(short = 'C', long = "case-insensitive")]
    case_insensitive: bool,

    /// guided mode: retry a failed parse with the span-constraint minimum
    /// length relaxed from 1 to 2
    #[arg(short = 'K', long = "guided")]
    guided: bool,

    /// increase logging verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// suppress all logging below error level
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// directory holding terms.txt, pSgT.txt, pUgT.txt, endings.txt, the
    /// structural tables, and the per-calc .g/.lambdas files
    model_dir: PathBuf,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn load_runtime(args: &Args) -> Result<ParserRuntime, ConfigError> {
    let dir = &args.model_dir;
    let symbols = SymbolTable::load(&dir.join("terms.txt"))?;
    let model = SmoothedModel::load(dir)?;
    let vocab = Vocabulary::load(&dir.join("pSgT.txt"))?;
    let grammar = Grammar::load(dir)?;
    Ok(ParserRuntime { symbols, model, vocab, grammar })
}

fn build_config(args: &Args) -> ParserConfig {
    ParserConfig {
        model_dir: args.model_dir.clone(),
        lang: args.lang,
        nbest: args.nbest,
        overparse_factor: args.overparse,
        max_sentence_len: args.maxlen,
        case_insensitive: args.case_insensitive,
        guided: args.guided,
        ..ParserConfig::default()
    }
}

/// Renders a derivation tree as a bracketed string, consuming leaves from
/// `leaves` in left-to-right order (answer trees carry the preterminal
/// label but not the original surface form, since OOV tokens have no
/// vocabulary entry to render from).
fn render_tree(
    id: AnswerTreeId,
    chart: &Chart,
    symbols: &SymbolTable,
    leaves: &mut std::slice::Iter<'_, Word>,
) -> String {
    let node = chart.tree(id);
    let label = symbols.name(node.terminal);
    if node.children.is_empty() {
        let surface = leaves.next().map(|w| w.surface.as_str()).unwrap_or("?");
        format!("({label} {surface})")
    } else {
        let mut out = format!("({label}");
        for &child in &node.children {
            out.push(' ');
            out.push_str(&render_tree(child, chart, symbols, leaves));
        }
        out.push(')');
        out
    }
}

fn run(args: Args) -> Result<(), StatrankError> {
    let runtime = load_runtime(&args)?;
    let config = build_config(&args);
    let pool = ThreadSlotPool::new(1);
    let guard = pool.acquire();
    let mut chart = Chart::new();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    for (lineno, line) in stdin.lock().lines().enumerate() {
        let line = line.map_err(statrank::error::InputError::from)?;
        if line.trim().is_empty() {
            continue;
        }
        guard.with_state(|state| state.reset());
        let sentence = chart::parse_tagged_line(&line, &runtime.vocab, config.case_insensitive, |surface| {
            guard.with_state(|state| state.oov_id(surface))
        })
        .map_err(|err| {
            error!("line {lineno}: {err}");
            err
        })?;

        if sentence.len() > config.max_sentence_len {
            return Err(statrank::error::InputError::SentenceTooLong {
                max: config.max_sentence_len,
                got: sentence.len(),
            }
            .into());
        }

        let ext_pos = ExtPosConstraints::new();
        let result = if config.guided {
            retry::parse_guided(&mut chart, &sentence, &runtime, &config, &ext_pos, &[])
        } else {
            chart.parse(&sentence, &runtime, &config, &ext_pos, &SpanConstraints::new(1))
        };

        match result {
            Ok(ranked) => {
                writeln!(out, "{}", ranked.len()).map_err(statrank::error::InputError::from)?;
                for (prob, tree) in &ranked {
                    let mut leaves = sentence.words.iter();
                    let bracketed = render_tree(*tree, &chart, &runtime.symbols, &mut leaves);
                    writeln!(out, "{prob} {bracketed}").map_err(statrank::error::InputError::from)?;
                }
            }
            Err(outcome) => {
                match outcome {
                    ParseOutcome::ParseFailure => warn!("line {lineno}: parse failure"),
                    ParseOutcome::OverflowFailure => warn!("line {lineno}: edge heap overflow"),
                    ParseOutcome::Timeout => warn!("line {lineno}: pop timeout"),
                }
                writeln!(out, "0").map_err(statrank::error::InputError::from)?;
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    if let Err(err) = run(args) {
        error!("{err}");
        std::process::exit(1);
    }
}
