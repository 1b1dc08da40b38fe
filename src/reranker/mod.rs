//! The discriminative N-best reranker trainer: loads a corpus of parses
//! with accompanying features, fits a sparse log-linear weight vector
//! against one of six loss variants, and cross-validates the regularizer
//! strength against a dev set. `cvlm-lbfgs` drives this module end to end;
//! `reranker::perceptron` is an alternative, simpler training path that
//! bypasses the regularized L-BFGS objective entirely.

pub mod corpus;
pub mod lbfgs;
pub mod loss;
pub mod outer_cv;
pub mod perceptron;
pub mod regularizer;
pub mod weights;

use crate::config::TrainerConfig;
use corpus::Corpus;
use lbfgs::LbfgsConfig;
use loss::{Loss, PrStats};
use outer_cv::{CvConfig, CvResult};
use perceptron::PerceptronConfig;
use regularizer::Regularizer;

/// The result of one `cvlm-lbfgs` run: the trained sparse weight vector,
/// the class coefficients the outer loop settled on, and the dev-set
/// statistics the run was judged by.
pub struct TrainReport {
    pub weights: Vec<f64>,
    pub c: Vec<f64>,
    pub dev_value: f64,
    pub dev_stats: PrStats,
    pub nfeatures: usize,
}

/// Ties together corpus loading, feature-class binning, the outer
/// cross-validation search and its inner L-BFGS/OWL-QN solves.
/// `feature_identifiers` is the optional string id per feature (from a
/// `-f featfile`); when absent every feature shares one regularizer class.
pub fn train(
    train_corpus: &Corpus,
    dev_corpus: &Corpus,
    feature_identifiers: Option<&[String]>,
    config: &TrainerConfig,
) -> TrainReport {
    let nfeatures = train_corpus.nfeatures.max(dev_corpus.nfeatures);
    let regularizer = match feature_identifiers {
        Some(ids) => Regularizer::new(ids, config.feature_class_depth),
        None => Regularizer::flat(nfeatures),
    };

    let cv_config = CvConfig {
        method: config.cv_method,
        power: config.regularizer_power,
        lbfgs: LbfgsConfig {
            tolerance: config.lbfgs_tolerance,
            ..LbfgsConfig::default()
        },
        max_evaluations: 200,
        log_c_bound: 10.0,
    };

    let CvResult { c, weights, dev_value, dev_stats } = outer_cv::search(
        &train_corpus.sentences,
        &dev_corpus.sentences,
        config.loss,
        &regularizer,
        nfeatures,
        config.c0,
        &cv_config,
    );

    TrainReport {
        weights,
        c,
        dev_value,
        dev_stats,
        nfeatures,
    }
}

/// The `--perceptron` training path: skips the regularizer search and
/// L-BFGS solve entirely, fitting the averaged perceptron directly against
/// `config.perceptron_*`, then scoring it against `dev_corpus` with the
/// same loss `cvlm-lbfgs` would have optimized, for a comparable report.
pub fn train_perceptron(
    train_corpus: &Corpus,
    dev_corpus: &Corpus,
    config: &TrainerConfig,
) -> TrainReport {
    let nfeatures = train_corpus.nfeatures.max(dev_corpus.nfeatures);
    let perceptron_config = PerceptronConfig {
        epochs: config.perceptron_epochs as f64,
        burnin: config.perceptron_burnin as f64,
        weight_decay: config.perceptron_weight_decay,
        ..PerceptronConfig::default()
    };
    let result = perceptron::train(&train_corpus.sentences, nfeatures, &perceptron_config);

    let dev_loss = loss::make_loss(config.loss, &dev_corpus.sentences);
    let mut dev_grad = vec![0.0; nfeatures];
    let mut dev_stats = PrStats::default();
    let dev_value = dev_loss.evaluate(&result.weights, &mut dev_grad, &mut dev_stats);

    TrainReport {
        weights: result.weights,
        c: vec![],
        dev_value,
        dev_stats,
        nfeatures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CvMethod, LossId};

    fn toy_corpus() -> Corpus {
        Corpus::parse("G=1 N=2\nP=1 W=1 0=1.0 ,\nP=1 W=0 0=0.1 ,\n").unwrap()
    }

    #[test]
    fn train_produces_a_weight_vector_sized_to_nfeatures() {
        let corpus = toy_corpus();
        let config = TrainerConfig {
            loss: LossId::LogLoss,
            cv_method: CvMethod::Powell,
            ..TrainerConfig::default()
        };
        let report = train(&corpus, &corpus, None, &config);
        assert_eq!(report.weights.len(), report.nfeatures);
        assert_eq!(report.nfeatures, corpus.nfeatures);
    }
}
