//! Error taxonomy, per the configuration / input / numerical split: fatal
//! errors propagate as `Result`, parse-time failures are a plain return
//! value (see [`crate::chart::ParseOutcome`]).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing model file: {0}")]
    MissingFile(PathBuf),

    #[error("corrupt model file {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("unknown loss id {0}")]
    UnknownLoss(u32),

    #[error("unknown cross-validation method {0:?}")]
    UnknownCvMethod(String),

    #[error("invalid combination of flags: {0}")]
    BadFlags(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed corpus record at sentence {sentence}: {reason}")]
    MalformedCorpus { sentence: usize, reason: String },

    #[error("sentence longer than MAXSENTLEN ({max}): got {got} tokens")]
    SentenceTooLong { max: usize, got: usize },

    #[error("malformed sentence input: {0}")]
    MalformedSentence(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum NumericError {
    #[error("non-finite loss encountered for loss id {loss_id} at iteration {iteration}")]
    NonFiniteLoss { loss_id: u32, iteration: usize },

    #[error("non-finite gradient component {index} for loss id {loss_id} at iteration {iteration}")]
    NonFiniteGradient {
        loss_id: u32,
        iteration: usize,
        index: usize,
    },
}

#[derive(Debug, Error)]
pub enum StatrankError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Numeric(#[from] NumericError),
}
