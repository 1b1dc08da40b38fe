//! The discriminative reranker trainer CLI: reads a corpus of N-best
//! parses with features from stdin, fits a sparse log-linear weight
//! vector under one of six loss variants, cross-validates the regularizer
//! strength against a dev/eval corpus, and writes the weights plus a
//! run-summary report.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use serde::Serialize;

use statrank::config::{CvMethod, LossId, TrainerConfig};
use statrank::error::{InputError, StatrankError};
use statrank::reranker::corpus::Corpus;
use statrank::reranker::{self, weights, TrainReport};

/// Cross-validating log-linear estimator for the N-best reranker.
#[derive(Parser, Debug)]
#[command(name = "cvlm-lbfgs")]
struct Args {
    /// loss function: 0=log 1=em-log 2=pairwise-log 3=exp 4=log-exp 5=fscore
    #[arg(short = 'l', long = "loss", default_value_t = 0)]
    loss: u32,

    /// initial regularizer constant
    #[arg(short = 'c', long = "c0", default_value_t = 1.0)]
    c0: f64,

    /// regularizer power p (p=1 drives the OWL-QN path)
    #[arg(short = 'p', long = "power", default_value_t = 2.0)]
    power: f64,

    /// L-BFGS relative-improvement stopping tolerance
    #[arg(short = 't', long = "tol", default_value_t = 1e-6)]
    tol: f64,

    /// feature-identifier file, one identifier per line in feature-id order
    #[arg(short = 'f', long = "featfile")]
    featfile: Option<PathBuf>,

    /// output path for the trained sparse weight vector
    #[arg(short = 'o', long = "weights", default_value = "weights.out")]
    weights: PathBuf,

    /// held-out corpus used to pick the regularizer strength; training
    /// corpus is reused when absent
    #[arg(short = 'e', long = "eval")]
    eval: Option<PathBuf>,

    /// outer cross-validation search method
    #[arg(short = 'm', long = "cv-method", default_value = "powell")]
    cv_method: CvMethod,

    /// number of `:`-separated prefix segments of a feature identifier
    /// that define its regularizer class
    #[arg(short = 'k', long = "feature-class-depth", default_value_t = 2)]
    feature_class_depth: usize,

    /// increase logging verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// suppress all logging below error level
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// fit with the averaged perceptron instead of regularized L-BFGS,
    /// skipping the outer cross-validation search entirely
    #[arg(long = "perceptron")]
    perceptron: bool,
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

fn build_config(args: &Args) -> Result<TrainerConfig, StatrankError> {
    let loss = LossId::from_u32(args.loss)
        .ok_or_else(|| statrank::error::ConfigError::UnknownLoss(args.loss))?;
    Ok(TrainerConfig {
        loss,
        regularizer_power: args.power,
        c0: args.c0,
        feature_class_depth: args.feature_class_depth,
        lbfgs_tolerance: args.tol,
        cv_method: args.cv_method,
        weights_path: args.weights.clone(),
        eval_path: args.eval.clone(),
        ..TrainerConfig::default()
    })
}

fn load_feature_identifiers(path: &PathBuf) -> Result<Vec<String>, InputError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(|l| l.trim().to_string()).collect())
}

#[derive(Serialize)]
struct RunSummary {
    loss: &'static str,
    nfeatures: usize,
    nonzero_weights: usize,
    regularizer_power: f64,
    c: Vec<f64>,
    dev_value: f64,
    dev_f_score: f64,
}

fn loss_name(id: LossId) -> &'static str {
    match id {
        LossId::LogLoss => "log_loss",
        LossId::EmLogLoss => "em_log_loss",
        LossId::PairwiseLogLoss => "pairwise_log_loss",
        LossId::ExpLoss => "exp_loss",
        LossId::LogExpLoss => "log_exp_loss",
        LossId::FscoreLoss => "fscore_loss",
    }
}

fn run(args: Args) -> Result<(), StatrankError> {
    let config = build_config(&args)?;

    let mut train_text = String::new();
    io::stdin().lock().read_to_string(&mut train_text).map_err(InputError::from)?;
    let train_corpus = Corpus::parse(&train_text)?;
    info!(
        "read {} training sentences, {} features",
        train_corpus.sentences.len(),
        train_corpus.nfeatures
    );

    let dev_corpus = match &config.eval_path {
        Some(path) => {
            let corpus = Corpus::load(path)?;
            info!("read {} eval sentences from {}", corpus.sentences.len(), path.display());
            corpus
        }
        None => train_corpus.clone(),
    };

    let feature_identifiers = args
        .featfile
        .as_ref()
        .map(load_feature_identifiers)
        .transpose()?;

    let report: TrainReport = if args.perceptron {
        reranker::train_perceptron(&train_corpus, &dev_corpus, &config)
    } else {
        reranker::train(
            &train_corpus,
            &dev_corpus,
            feature_identifiers.as_deref(),
            &config,
        )
    };

    weights::save(&config.weights_path, &report.weights)?;
    info!(
        "wrote {} nonzero weights to {}",
        report.weights.iter().filter(|&&w| w != 0.0).count(),
        config.weights_path.display()
    );

    let summary = RunSummary {
        loss: loss_name(config.loss),
        nfeatures: report.nfeatures,
        nonzero_weights: report.weights.iter().filter(|&&w| w != 0.0).count(),
        regularizer_power: config.regularizer_power,
        c: report.c,
        dev_value: report.dev_value,
        dev_f_score: report.dev_stats.f_score(),
    };

    if let Some(eval_path) = &config.eval_path {
        let summary_path = eval_path.with_extension("summary.json");
        let mut out = std::fs::File::create(&summary_path).map_err(InputError::from)?;
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| InputError::MalformedSentence(format!("could not serialize run summary: {e}")))?;
        writeln!(out, "{json}").map_err(InputError::from)?;
        info!("wrote run summary to {}", summary_path.display());
    } else {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| InputError::MalformedSentence(format!("could not serialize run summary: {e}")))?;
        println!("{json}");
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
