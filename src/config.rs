//! Explicit, immutable configuration structs threaded through the call
//! graph, in place of global mutable statics.

use crate::grammar::Grammar;
use crate::model::SmoothedModel;
use crate::symbol::SymbolTable;
use crate::vocab::Vocabulary;
use std::path::PathBuf;

/// A CLI-facing enum's rejection reason. `String`-typed `FromStr::Err`s
/// don't implement `std::error::Error`, which `clap`'s derive value parser
/// requires, so every enum parsed off the command line routes its error
/// through this instead.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ParseEnumError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    En,
    Ch,
    Ar,
}

impl std::str::FromStr for Lang {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "En" | "en" => Ok(Lang::En),
            "Ch" | "ch" => Ok(Lang::Ch),
            "Ar" | "ar" => Ok(Lang::Ar),
            other => Err(ParseEnumError(format!("unknown language {other}"))),
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lang::En => "En",
            Lang::Ch => "Ch",
            Lang::Ar => "Ar",
        };
        f.write_str(s)
    }
}

/// Immutable, per-process parser configuration. Built once from CLI flags
/// and the model directory and shared (by reference) across every thread
/// slot.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub model_dir: PathBuf,
    pub lang: Lang,
    pub nbest: usize,
    pub overparse_factor: f64,
    pub max_sentence_len: usize,
    pub edge_heap_initial_capacity: usize,
    pub edge_heap_hard_cap: usize,
    pub nbest_extract_budget: usize,
    pub demerit_factor: f64,
    pub demerit_bound: u32,
    pub case_insensitive: bool,
    pub guided: bool,
    pub span_min_length: usize,
    pub pop_timeout: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            model_dir: PathBuf::new(),
            lang: Lang::En,
            nbest: 50,
            overparse_factor: 1.5,
            max_sentence_len: 400,
            edge_heap_initial_capacity: 4096,
            edge_heap_hard_cap: 370_000,
            nbest_extract_budget: 20_000,
            demerit_factor: 0.8,
            demerit_bound: 12,
            case_insensitive: false,
            guided: false,
            span_min_length: 1,
            pop_timeout: 400_000,
        }
    }
}

/// Everything loaded once at process start: symbols, the smoothed model,
/// the vocabulary. Shared read-only across parse threads.
pub struct ParserRuntime {
    pub symbols: SymbolTable,
    pub model: SmoothedModel,
    pub vocab: Vocabulary,
    pub grammar: Grammar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossId {
    LogLoss = 0,
    EmLogLoss = 1,
    PairwiseLogLoss = 2,
    ExpLoss = 3,
    LogExpLoss = 4,
    FscoreLoss = 5,
}

impl LossId {
    pub fn from_u32(v: u32) -> Option<LossId> {
        Some(match v {
            0 => LossId::LogLoss,
            1 => LossId::EmLogLoss,
            2 => LossId::PairwiseLogLoss,
            3 => LossId::ExpLoss,
            4 => LossId::LogExpLoss,
            5 => LossId::FscoreLoss,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvMethod {
    Powell,
    NelderMead,
    Cobyla,
}

impl std::str::FromStr for CvMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "powell" => Ok(CvMethod::Powell),
            "nelder-mead" | "neldermead" | "simplex" => Ok(CvMethod::NelderMead),
            "cobyla" => Ok(CvMethod::Cobyla),
            other => Err(ParseEnumError(format!("unknown cross-validation method {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub loss: LossId,
    pub regularizer_power: f64,
    pub c0: f64,
    pub feature_class_depth: usize,
    pub lbfgs_tolerance: f64,
    pub cv_method: CvMethod,
    pub perceptron_epochs: usize,
    pub perceptron_burnin: usize,
    pub perceptron_weight_decay: f64,
    pub train_path: PathBuf,
    pub dev_path: Option<PathBuf>,
    pub weights_path: PathBuf,
    pub eval_path: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            loss: LossId::LogLoss,
            regularizer_power: 2.0,
            c0: 1.0,
            feature_class_depth: 2,
            lbfgs_tolerance: 1e-6,
            cv_method: CvMethod::Powell,
            perceptron_epochs: 10,
            perceptron_burnin: 0,
            perceptron_weight_decay: 0.0,
            train_path: PathBuf::new(),
            dev_path: None,
            weights_path: PathBuf::from("weights.out"),
            eval_path: None,
        }
    }
}
