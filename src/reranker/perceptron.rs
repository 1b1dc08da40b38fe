//! Averaged perceptron training, plain and per-feature-class-weighted,
//! grounded on `avper.cc`'s `ap_sentence`/`wap_sentence`: draw a random
//! training sentence, compare its highest-scoring parse against the
//! corpus-designated correct one, and on a mistake nudge the weight
//! vector by their feature difference times a step size that decays
//! exponentially over the run. The returned vector is the time-average of
//! every iterate, not the final one.
//!
//! Unlike `ap_sentence`'s lazy `changed[]`-indexed bookkeeping (which
//! defers folding a feature into the running sum until it next fires, to
//! avoid touching every feature on every iteration), the sum here is
//! accumulated densely once per iteration. Simpler to get right without a
//! compiler to check it against, at the cost of the original's sparse
//! update performance.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::reranker::corpus::{RerankParse, RerankSentence};
use crate::reranker::regularizer::Regularizer;

#[derive(Debug, Clone)]
pub struct PerceptronConfig {
    pub epochs: f64,
    pub burnin: f64,
    pub step_reduce: f64,
    pub weight_decay: f64,
    pub random_seed: u64,
}

impl Default for PerceptronConfig {
    fn default() -> Self {
        PerceptronConfig {
            epochs: 10.0,
            burnin: 0.0,
            step_reduce: 0.0,
            weight_decay: 0.0,
            random_seed: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainResult {
    pub weights: Vec<f64>,
}

pub fn train(sentences: &[RerankSentence], nfeatures: usize, config: &PerceptronConfig) -> TrainResult {
    train_inner(sentences, nfeatures, config, None, None)
}

/// The per-feature-class step-size variant (`wap_sentence`/`gavper.cc`):
/// every update to a feature in class `k` is scaled by `class_step[k]`.
pub fn train_weighted(
    sentences: &[RerankSentence],
    nfeatures: usize,
    config: &PerceptronConfig,
    classes: &Regularizer,
    class_step: &[f64],
) -> TrainResult {
    train_inner(sentences, nfeatures, config, Some(classes), Some(class_step))
}

fn train_inner(
    sentences: &[RerankSentence],
    nfeatures: usize,
    config: &PerceptronConfig,
    classes: Option<&Regularizer>,
    class_step: Option<&[f64]>,
) -> TrainResult {
    let mut w = vec![0.0; nfeatures];
    if config.epochs + config.burnin <= 0.0 {
        return TrainResult { weights: w };
    }

    let usable: Vec<&RerankSentence> = sentences
        .iter()
        .filter(|s| s.px > 0.0 && !s.parses.is_empty())
        .collect();
    if usable.is_empty() {
        return TrainResult { weights: w };
    }
    let n = usable.len();

    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let mut dw = 1.0f64;
    let ddw = if config.step_reduce == 0.0 {
        1.0
    } else {
        (1.0 - config.step_reduce).powf(1.0 / n as f64)
    };

    let burnin_iters = (config.burnin * n as f64).round() as u64;
    for _ in 0..burnin_iters {
        let sentence = usable[rng.gen_range(0..n)];
        perceptron_step(sentence, &mut w, dw, classes, class_step);
        dw *= ddw;
    }

    let main_iters = (config.epochs * n as f64).round() as u64;
    let mut sum_w = vec![0.0; nfeatures];
    let mut iterations = 0u64;
    for _ in 0..main_iters {
        let sentence = usable[rng.gen_range(0..n)];
        perceptron_step(sentence, &mut w, dw, classes, class_step);
        if config.weight_decay > 0.0 {
            let decay = 1.0 - config.weight_decay / n as f64;
            for wj in w.iter_mut() {
                *wj *= decay;
            }
        }
        dw *= ddw;
        for (s, &wj) in sum_w.iter_mut().zip(&w) {
            *s += wj;
        }
        iterations += 1;
    }

    if iterations == 0 {
        return TrainResult { weights: w };
    }
    for s in sum_w.iter_mut() {
        *s /= iterations as f64;
    }
    TrainResult { weights: sum_w }
}

fn parse_score(parse: &RerankParse, w: &[f64]) -> f64 {
    parse
        .features
        .iter()
        .map(|&(f, c)| w.get(f as usize).copied().unwrap_or(0.0) * c)
        .sum()
}

/// One round of the averaged perceptron: compare the highest-scoring
/// parse against the sentence's correct parse, and nudge the weight
/// vector toward the correct one if they differ.
fn perceptron_step(
    sentence: &RerankSentence,
    w: &mut [f64],
    dw: f64,
    classes: Option<&Regularizer>,
    class_step: Option<&[f64]>,
) {
    let correct = sentence.correct_index;
    let correct_parse = &sentence.parses[correct];

    let mut best_i = 0usize;
    let mut best_score = f64::NEG_INFINITY;
    for (i, parse) in sentence.parses.iter().enumerate() {
        let score = parse_score(parse, w);
        if score >= best_score {
            best_score = score;
            best_i = i;
        }
    }
    if best_i == correct {
        return;
    }
    let winner = &sentence.parses[best_i];
    if winner.pyx >= correct_parse.pyx {
        return;
    }

    let step = sentence.px * dw * (correct_parse.pyx - winner.pyx).abs() / correct_parse.pyx.max(1e-12);
    apply_update(winner, w, -step, classes, class_step);
    apply_update(correct_parse, w, step, classes, class_step);
}

fn apply_update(
    parse: &RerankParse,
    w: &mut [f64],
    amount: f64,
    classes: Option<&Regularizer>,
    class_step: Option<&[f64]>,
) {
    for &(f, c) in &parse.features {
        let scale = match (classes, class_step) {
            (Some(reg), Some(steps)) => steps.get(reg.class_of(f as usize)).copied().unwrap_or(1.0),
            _ => 1.0,
        };
        if let Some(slot) = w.get_mut(f as usize) {
            *slot += amount * c * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_sentence(correct: usize, f1_counts: &[f64]) -> RerankSentence {
        let parses = f1_counts
            .iter()
            .enumerate()
            .map(|(i, &c)| RerankParse {
                features: vec![(1, c)],
                p_edges: 1.0,
                w_correct: if i == correct { 1.0 } else { 0.0 },
                pyx: if i == correct { 1.0 } else { 0.0 },
            })
            .collect();
        RerankSentence {
            gold_edges: 1.0,
            px: 1.0,
            correct_index: correct,
            parses,
        }
    }

    #[test]
    fn zero_epochs_and_burnin_returns_zero_vector() {
        let sentences = vec![toy_sentence(0, &[1.0, 0.5])];
        let config = PerceptronConfig {
            epochs: 0.0,
            burnin: 0.0,
            ..PerceptronConfig::default()
        };
        let result = train(&sentences, 2, &config);
        assert_eq!(result.weights, vec![0.0, 0.0]);
    }

    #[test]
    fn learns_to_favor_the_correct_parses_feature() {
        // correct parse always has a larger feature-1 count than the rival.
        let sentences = vec![
            toy_sentence(0, &[1.0, 0.0]),
            toy_sentence(1, &[0.0, 1.0]),
            toy_sentence(0, &[2.0, 0.0]),
        ];
        let config = PerceptronConfig {
            epochs: 50.0,
            burnin: 5.0,
            random_seed: 7,
            ..PerceptronConfig::default()
        };
        let result = train(&sentences, 2, &config);
        assert!(result.weights[1] > 0.0, "feature 1 weight should be positive: {:?}", result.weights);
    }
}
