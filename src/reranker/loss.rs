//! The six regularized-loss variants the reranker trainer can minimize,
//! behind a single [`Loss`] trait so the outer optimizer never needs to
//! know which one it's driving.
//!
//! `pairwise_log_loss`'s gradient on the correct-parse branch is re-derived
//! here from the loss's mathematical definition (accumulate `-sigma(diff)`
//! into the correct parse for every losing pair) rather than copied from
//! any existing implementation; the bookkeeping is easy to get backwards on
//! that particular branch.

use crate::config::LossId;
use crate::reranker::corpus::{RerankParse, RerankSentence};

/// Running sums used both to report dev-set F-score and, for
/// [`FscoreLoss`], as the loss itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrStats {
    pub g: f64,
    pub p: f64,
    pub w: f64,
}

impl PrStats {
    pub fn f_score(&self) -> f64 {
        let denom = self.p + self.g;
        if denom <= 0.0 {
            0.0
        } else {
            2.0 * self.w / denom
        }
    }
}

pub trait Loss {
    /// Accumulates the gradient of the regularized-loss term into `grad`
    /// (which the caller has already zeroed) and returns the loss value.
    /// `stats` accumulates the running g/p/w sums for F-score reporting.
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64;
}

fn scores(sentence: &RerankSentence, w: &[f64]) -> Vec<f64> {
    sentence
        .parses
        .iter()
        .map(|parse| {
            parse
                .features
                .iter()
                .map(|&(f, c)| w.get(f as usize).copied().unwrap_or(0.0) * c)
                .sum()
        })
        .collect()
}

/// Numerically stable softmax via max-subtraction.
fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|&s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum <= 0.0 {
        vec![0.0; raw.len()]
    } else {
        exps.iter().map(|&e| e / sum).collect()
    }
}

fn accumulate(grad: &mut [f64], parse: &RerankParse, coeff: f64) {
    if coeff == 0.0 {
        return;
    }
    for &(f, c) in &parse.features {
        if let Some(slot) = grad.get_mut(f as usize) {
            *slot += coeff * c;
        }
    }
}

fn record_one_best(sentence: &RerankSentence, raw: &[f64], stats: &mut PrStats) {
    let best = raw
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    stats.g += sentence.gold_edges;
    if let Some(parse) = sentence.parses.get(best) {
        stats.p += parse.p_edges;
        stats.w += parse.w_correct;
    }
}

/// `-Px * Σ_y Pe(y|x) log Pw(y|x)`, the baseline conditional log loss.
pub struct LogLoss<'a> {
    pub sentences: &'a [RerankSentence],
}

impl<'a> Loss for LogLoss<'a> {
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let mut total = 0.0;
        for sentence in self.sentences {
            if sentence.px <= 0.0 {
                continue;
            }
            let raw = scores(sentence, w);
            let pw = softmax(&raw);
            for (i, parse) in sentence.parses.iter().enumerate() {
                if parse.pyx > 0.0 {
                    total -= sentence.px * parse.pyx * pw[i].max(1e-300).ln();
                }
                accumulate(grad, parse, sentence.px * (pw[i] - parse.pyx));
            }
            record_one_best(sentence, &raw, stats);
        }
        total
    }
}

/// `-Px * log Σ_y Pe(y|x) Pw(y|x)`, the EM-style marginal log loss.
pub struct EmLogLoss<'a> {
    pub sentences: &'a [RerankSentence],
}

impl<'a> Loss for EmLogLoss<'a> {
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let mut total = 0.0;
        for sentence in self.sentences {
            if sentence.px <= 0.0 {
                continue;
            }
            let raw = scores(sentence, w);
            let pw = softmax(&raw);
            let joint: Vec<f64> = sentence
                .parses
                .iter()
                .zip(&pw)
                .map(|(parse, &pwi)| parse.pyx * pwi)
                .collect();
            let z = joint.iter().sum::<f64>().max(1e-300);
            total -= sentence.px * z.ln();
            for (i, parse) in sentence.parses.iter().enumerate() {
                let q = joint[i] / z;
                accumulate(grad, parse, sentence.px * (pw[i] - q));
            }
            record_one_best(sentence, &raw, stats);
        }
        total
    }
}

/// `Σ_{y≠y*} Px · log(1 + exp(score(y) − score(y*)))`, a logistic loss over
/// every (losing parse, correct parse) pair in the sentence.
pub struct PairwiseLogLoss<'a> {
    pub sentences: &'a [RerankSentence],
}

impl<'a> Loss for PairwiseLogLoss<'a> {
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let mut total = 0.0;
        for sentence in self.sentences {
            if sentence.px <= 0.0 || sentence.parses.len() < 2 {
                if sentence.px > 0.0 {
                    let raw = scores(sentence, w);
                    record_one_best(sentence, &raw, stats);
                }
                continue;
            }
            let raw = scores(sentence, w);
            let star = sentence.correct_index;
            let s_star = raw[star];
            let mut correct_coeff = 0.0;
            for (i, parse) in sentence.parses.iter().enumerate() {
                if i == star {
                    continue;
                }
                let diff = raw[i] - s_star;
                let term = if diff > 0.0 {
                    diff + (-diff).exp().ln_1p()
                } else {
                    diff.exp().ln_1p()
                };
                total += sentence.px * term;
                let sigma = 1.0 / (1.0 + (-diff).exp());
                accumulate(grad, parse, sentence.px * sigma);
                correct_coeff -= sentence.px * sigma;
            }
            accumulate(grad, &sentence.parses[star], correct_coeff);
            record_one_best(sentence, &raw, stats);
        }
        total
    }
}

const EXP_LOSS_MARGIN_CUTOFF: f64 = 30.0;

/// `exp(diff)` for `diff` past the cutoff is replaced by its tangent line
/// at the cutoff, so a badly mis-ranked pair contributes a bounded
/// gradient instead of overflowing.
fn stable_exp(diff: f64) -> (f64, f64) {
    if diff > EXP_LOSS_MARGIN_CUTOFF {
        let base = EXP_LOSS_MARGIN_CUTOFF.exp();
        (base * (1.0 + (diff - EXP_LOSS_MARGIN_CUTOFF)), base)
    } else {
        let e = diff.exp();
        (e, e)
    }
}

/// `Σ_{y≠y*} exp(score(y) − score(y*))`, the boosting-style pairwise loss.
pub struct ExpLoss<'a> {
    pub sentences: &'a [RerankSentence],
}

impl<'a> Loss for ExpLoss<'a> {
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let mut total = 0.0;
        for sentence in self.sentences {
            if sentence.px <= 0.0 {
                continue;
            }
            let raw = scores(sentence, w);
            let star = sentence.correct_index;
            let s_star = raw[star];
            let mut correct_coeff = 0.0;
            for (i, parse) in sentence.parses.iter().enumerate() {
                if i == star {
                    continue;
                }
                let diff = raw[i] - s_star;
                let (value, dvalue) = stable_exp(diff);
                total += sentence.px * value;
                accumulate(grad, parse, sentence.px * dvalue);
                correct_coeff -= sentence.px * dvalue;
            }
            accumulate(grad, &sentence.parses[star], correct_coeff);
            record_one_best(sentence, &raw, stats);
        }
        total
    }
}

/// `log Σ_{x,y≠y*} Px · exp(score(y) − score(y*)))`, a single scalar over
/// the whole corpus rather than a per-sentence sum. Stabilized with a
/// global max-subtraction the way a multi-sentence logsumexp has to be.
pub struct LogExpLoss<'a> {
    pub sentences: &'a [RerankSentence],
}

impl<'a> Loss for LogExpLoss<'a> {
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let mut per_sentence_raw = Vec::with_capacity(self.sentences.len());
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        let mut global_max = f64::NEG_INFINITY;

        for (sidx, sentence) in self.sentences.iter().enumerate() {
            if sentence.px <= 0.0 {
                per_sentence_raw.push(Vec::new());
                continue;
            }
            let raw = scores(sentence, w);
            let star = sentence.correct_index;
            let s_star = raw[star];
            for (i, _) in sentence.parses.iter().enumerate() {
                if i == star {
                    continue;
                }
                let diff = raw[i] - s_star;
                global_max = global_max.max(diff);
                pairs.push((sidx, i, diff));
            }
            record_one_best(sentence, &raw, stats);
            per_sentence_raw.push(raw);
        }

        if pairs.is_empty() {
            return 0.0;
        }
        let weighted: Vec<f64> = pairs
            .iter()
            .map(|&(sidx, _, diff)| self.sentences[sidx].px * (diff - global_max).exp())
            .collect();
        let z: f64 = weighted.iter().sum::<f64>().max(1e-300);

        for (k, &(sidx, i, _)) in pairs.iter().enumerate() {
            let coeff = weighted[k] / z;
            let sentence = &self.sentences[sidx];
            accumulate(grad, &sentence.parses[i], coeff);
            accumulate(grad, &sentence.parses[sentence.correct_index], -coeff);
        }

        global_max + z.ln()
    }
}

/// `1 − 2·E_w[w] / (E_w[p] + g)`, maximizing expected F-score directly
/// rather than optimizing a surrogate. `E_w[·]` is the expectation of the
/// per-parse quantity under the current softmax `Pw`.
pub struct FscoreLoss<'a> {
    pub sentences: &'a [RerankSentence],
}

impl<'a> Loss for FscoreLoss<'a> {
    fn evaluate(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let nfeatures = grad.len();
        let mut d_ew_w = vec![0.0; nfeatures];
        let mut d_ew_p = vec![0.0; nfeatures];
        let mut ew_w_total = 0.0;
        let mut ew_p_total = 0.0;
        let mut g_total = 0.0;

        for sentence in self.sentences {
            if sentence.px <= 0.0 {
                continue;
            }
            let raw = scores(sentence, w);
            let pw = softmax(&raw);
            let ew_w_x: f64 = pw
                .iter()
                .zip(&sentence.parses)
                .map(|(&p, parse)| p * parse.w_correct)
                .sum();
            let ew_p_x: f64 = pw
                .iter()
                .zip(&sentence.parses)
                .map(|(&p, parse)| p * parse.p_edges)
                .sum();
            ew_w_total += ew_w_x;
            ew_p_total += ew_p_x;
            g_total += sentence.gold_edges;

            for (i, parse) in sentence.parses.iter().enumerate() {
                accumulate(&mut d_ew_w, parse, pw[i] * (parse.w_correct - ew_w_x));
                accumulate(&mut d_ew_p, parse, pw[i] * (parse.p_edges - ew_p_x));
            }
            stats.g += sentence.gold_edges;
            stats.p += ew_p_x;
            stats.w += ew_w_x;
        }

        let n = 2.0 * ew_w_total;
        let d = (ew_p_total + g_total).max(1e-300);
        for j in 0..nfeatures {
            grad[j] += -(d * 2.0 * d_ew_w[j] - n * d_ew_p[j]) / (d * d);
        }
        1.0 - n / d
    }
}

pub fn make_loss<'a>(id: LossId, sentences: &'a [RerankSentence]) -> Box<dyn Loss + 'a> {
    match id {
        LossId::LogLoss => Box::new(LogLoss { sentences }),
        LossId::EmLogLoss => Box::new(EmLogLoss { sentences }),
        LossId::PairwiseLogLoss => Box::new(PairwiseLogLoss { sentences }),
        LossId::ExpLoss => Box::new(ExpLoss { sentences }),
        LossId::LogExpLoss => Box::new(LogExpLoss { sentences }),
        LossId::FscoreLoss => Box::new(FscoreLoss { sentences }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(correct: usize, scored: &[(f64, f64)]) -> RerankSentence {
        // scored[i] = (feature-1 count, w_correct); feature 1 is the only
        // feature, feature 0 is left empty, p_edges fixed at 1.
        let parses = scored
            .iter()
            .enumerate()
            .map(|(i, &(f1, wc))| RerankParse {
                features: vec![(1, f1)],
                p_edges: 1.0,
                w_correct: wc,
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
    fn log_loss_gradient_matches_finite_difference() {
        let sentences = vec![sentence(0, &[(1.0, 1.0), (0.5, 0.0)])];
        let loss = LogLoss { sentences: &sentences };
        let w = [0.3, -0.2];
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let base = loss.evaluate(&w, &mut grad, &mut stats);

        let eps = 1e-6;
        for j in 0..2 {
            let mut wp = w;
            wp[j] += eps;
            let mut g2 = vec![0.0; 2];
            let mut s2 = PrStats::default();
            let plus = loss.evaluate(&wp, &mut g2, &mut s2);
            let numeric = (plus - base) / eps;
            assert!(
                (numeric - grad[j]).abs() < 1e-3,
                "feature {j}: numeric {numeric} vs analytic {}",
                grad[j]
            );
        }
    }

    #[test]
    fn pairwise_log_loss_gradient_matches_finite_difference() {
        let sentences = vec![sentence(1, &[(1.0, 0.0), (2.0, 1.0)])];
        let loss = PairwiseLogLoss { sentences: &sentences };
        let w = [0.0, 0.1];
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let base = loss.evaluate(&w, &mut grad, &mut stats);

        let eps = 1e-6;
        let mut wp = w;
        wp[1] += eps;
        let mut g2 = vec![0.0; 2];
        let mut s2 = PrStats::default();
        let plus = loss.evaluate(&wp, &mut g2, &mut s2);
        let numeric = (plus - base) / eps;
        assert!((numeric - grad[1]).abs() < 1e-3);
    }

    #[test]
    fn em_log_loss_gradient_matches_finite_difference() {
        let sentences = vec![sentence(0, &[(1.0, 1.0), (0.5, 0.0)])];
        let loss = EmLogLoss { sentences: &sentences };
        let w = [0.3, -0.2];
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let base = loss.evaluate(&w, &mut grad, &mut stats);

        let eps = 1e-6;
        for j in 0..2 {
            let mut wp = w;
            wp[j] += eps;
            let mut g2 = vec![0.0; 2];
            let mut s2 = PrStats::default();
            let plus = loss.evaluate(&wp, &mut g2, &mut s2);
            let numeric = (plus - base) / eps;
            assert!(
                (numeric - grad[j]).abs() < 1e-3,
                "feature {j}: numeric {numeric} vs analytic {}",
                grad[j]
            );
        }
    }

    #[test]
    fn exp_loss_gradient_matches_finite_difference() {
        let sentences = vec![sentence(1, &[(1.0, 0.0), (2.0, 1.0)])];
        let loss = ExpLoss { sentences: &sentences };
        let w = [0.0, 0.1];
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let base = loss.evaluate(&w, &mut grad, &mut stats);

        let eps = 1e-6;
        for j in 0..2 {
            let mut wp = w;
            wp[j] += eps;
            let mut g2 = vec![0.0; 2];
            let mut s2 = PrStats::default();
            let plus = loss.evaluate(&wp, &mut g2, &mut s2);
            let numeric = (plus - base) / eps;
            assert!(
                (numeric - grad[j]).abs() < 1e-3,
                "feature {j}: numeric {numeric} vs analytic {}",
                grad[j]
            );
        }
    }

    #[test]
    fn log_exp_loss_gradient_matches_finite_difference() {
        let sentences = vec![
            sentence(0, &[(1.0, 1.0), (0.5, 0.0)]),
            sentence(1, &[(0.2, 0.0), (1.5, 1.0)]),
        ];
        let loss = LogExpLoss { sentences: &sentences };
        let w = [0.1, -0.3];
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let base = loss.evaluate(&w, &mut grad, &mut stats);

        let eps = 1e-6;
        for j in 0..2 {
            let mut wp = w;
            wp[j] += eps;
            let mut g2 = vec![0.0; 2];
            let mut s2 = PrStats::default();
            let plus = loss.evaluate(&wp, &mut g2, &mut s2);
            let numeric = (plus - base) / eps;
            assert!(
                (numeric - grad[j]).abs() < 1e-3,
                "feature {j}: numeric {numeric} vs analytic {}",
                grad[j]
            );
        }
    }

    #[test]
    fn fscore_loss_gradient_matches_finite_difference() {
        let sentences = vec![sentence(0, &[(1.0, 1.0), (0.5, 0.0)])];
        let loss = FscoreLoss { sentences: &sentences };
        let w = [0.2, 0.4];
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let base = loss.evaluate(&w, &mut grad, &mut stats);

        let eps = 1e-6;
        for j in 0..2 {
            let mut wp = w;
            wp[j] += eps;
            let mut g2 = vec![0.0; 2];
            let mut s2 = PrStats::default();
            let plus = loss.evaluate(&wp, &mut g2, &mut s2);
            let numeric = (plus - base) / eps;
            assert!(
                (numeric - grad[j]).abs() < 1e-3,
                "feature {j}: numeric {numeric} vs analytic {}",
                grad[j]
            );
        }
    }

    #[test]
    fn zero_px_sentence_contributes_nothing() {
        let mut sentence = sentence(0, &[(1.0, 1.0), (0.0, 0.0)]);
        sentence.px = 0.0;
        let sentences = vec![sentence];
        let loss = LogLoss { sentences: &sentences };
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let value = loss.evaluate(&[1.0, 1.0], &mut grad, &mut stats);
        assert_eq!(value, 0.0);
        assert_eq!(grad, vec![0.0, 0.0]);
    }

    #[test]
    fn fscore_loss_decreases_as_correct_parse_is_favored() {
        let sentences = vec![sentence(0, &[(1.0, 1.0), (0.0, 0.0)])];
        let loss = FscoreLoss { sentences: &sentences };
        let mut grad = vec![0.0; 2];
        let mut stats = PrStats::default();
        let at_zero = loss.evaluate(&[0.0, 0.0], &mut grad, &mut stats);

        let mut grad2 = vec![0.0; 2];
        let mut stats2 = PrStats::default();
        let favoring_correct = loss.evaluate(&[0.0, 5.0], &mut grad2, &mut stats2);
        assert!(favoring_correct < at_zero);
    }
}
