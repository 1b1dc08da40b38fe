//! The outer loop that tunes the regularizer class coefficients `c_k`
//! (searched over `log c`) against dev-set loss, re-solving the inner
//! L-BFGS/OWL-QN objective at every trial point. Each inner solve is warm
//! started from the previous one's weights; the best (value, weights, c)
//! triple seen anywhere in the search is what's returned, not wherever
//! the search happens to end up.
//!
//! `Powell` and `NelderMead` are the textbook derivative-free methods.
//! `Cobyla` stands in for true COBYLA with compass/pattern search:
//! COBYLA's linear-program trust-region subproblem isn't worth hand
//! rolling for an unconstrained search over `log c`, and pattern search
//! converges to the same kind of answer here.

use crate::config::{CvMethod, LossId};
use crate::reranker::corpus::RerankSentence;
use crate::reranker::lbfgs::{self, LbfgsConfig, RegularizedObjective};
use crate::reranker::loss::{self, Loss, PrStats};
use crate::reranker::regularizer::Regularizer;

#[derive(Debug, Clone)]
pub struct CvConfig {
    pub method: CvMethod,
    pub power: f64,
    pub lbfgs: LbfgsConfig,
    pub max_evaluations: usize,
    pub log_c_bound: f64,
}

impl Default for CvConfig {
    fn default() -> Self {
        CvConfig {
            method: CvMethod::Powell,
            power: 2.0,
            lbfgs: LbfgsConfig::default(),
            max_evaluations: 200,
            log_c_bound: 10.0,
        }
    }
}

pub struct CvResult {
    pub c: Vec<f64>,
    pub weights: Vec<f64>,
    pub dev_value: f64,
    pub dev_stats: PrStats,
}

pub fn search(
    train: &[RerankSentence],
    dev: &[RerankSentence],
    loss_id: LossId,
    regularizer: &Regularizer,
    nfeatures: usize,
    c0: f64,
    config: &CvConfig,
) -> CvResult {
    let nclasses = regularizer.nclasses();
    let train_loss = loss::make_loss(loss_id, train);
    let dev_loss = loss::make_loss(loss_id, dev);

    let mut warm_start = vec![0.0; nfeatures];
    let mut best_value = f64::INFINITY;
    let mut best_weights = warm_start.clone();
    let mut best_c = vec![c0.max(1e-6); nclasses];
    let mut best_stats = PrStats::default();

    {
        let mut eval_point = |log_c: &[f64]| -> f64 {
            let c: Vec<f64> = log_c.iter().map(|&lc| lc.exp()).collect();
            let objective = RegularizedObjective {
                loss: train_loss.as_ref(),
                regularizer,
                c,
                power: config.power,
                center: vec![],
            };
            let solution = lbfgs::minimize(&objective, warm_start.clone(), &config.lbfgs);
            warm_start = solution.weights.clone();

            let mut dev_grad = vec![0.0; nfeatures];
            let mut dev_stats = PrStats::default();
            let value = dev_loss.evaluate(&solution.weights, &mut dev_grad, &mut dev_stats);
            if value < best_value {
                best_value = value;
                best_weights = solution.weights.clone();
                best_c = log_c.iter().map(|&lc| lc.exp()).collect();
                best_stats = dev_stats;
            }
            value
        };

        let log_c0: Vec<f64> = vec![c0.max(1e-6).ln(); nclasses];
        match config.method {
            CvMethod::Powell => {
                powell_search(log_c0, config.log_c_bound, config.max_evaluations, &mut eval_point)
            }
            CvMethod::NelderMead => {
                nelder_mead(log_c0, 1.0, config.max_evaluations, &mut eval_point)
            }
            CvMethod::Cobyla => {
                pattern_search(log_c0, 1.0, config.max_evaluations, &mut eval_point)
            }
        };
    }

    CvResult {
        c: best_c,
        weights: best_weights,
        dev_value: best_value,
        dev_stats: best_stats,
    }
}

fn golden_section_1d(mut f: impl FnMut(f64) -> f64, lo: f64, hi: f64, iters: usize) -> f64 {
    let gr = 0.6180339887498949;
    let (mut a, mut b) = (lo, hi);
    let mut c = b - gr * (b - a);
    let mut d = a + gr * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..iters {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - gr * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + gr * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}

/// Coordinate descent with a golden-section line search along each axis
/// in turn, cycled for `max_evaluations / (20 * n)` rounds.
fn powell_search(mut x: Vec<f64>, bound: f64, max_evaluations: usize, eval: &mut impl FnMut(&[f64]) -> f64) {
    let n = x.len().max(1);
    let per_dim = 20usize;
    let rounds = (max_evaluations / (per_dim * n)).max(1);
    for _ in 0..rounds {
        for j in 0..x.len() {
            let xj = golden_section_1d(
                |v| {
                    let mut candidate = x.clone();
                    candidate[j] = v;
                    eval(&candidate)
                },
                -bound,
                bound,
                per_dim,
            );
            x[j] = xj;
        }
    }
}

fn nelder_mead(x0: Vec<f64>, step: f64, max_evaluations: usize, eval: &mut impl FnMut(&[f64]) -> f64) {
    let n = x0.len();
    if n == 0 {
        return;
    }
    let mut simplex: Vec<Vec<f64>> = vec![x0.clone()];
    for i in 0..n {
        let mut v = x0.clone();
        v[i] += step;
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();
    let mut evaluations = values.len();

    while evaluations < max_evaluations {
        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let best = values[0];
        let worst = values[n];
        let second_worst = values[n - 1];

        let mut centroid = vec![0.0; n];
        for point in &simplex[0..n] {
            for k in 0..n {
                centroid[k] += point[k] / n as f64;
            }
        }

        let reflected: Vec<f64> = (0..n).map(|k| centroid[k] + (centroid[k] - simplex[n][k])).collect();
        let f_reflected = eval(&reflected);
        evaluations += 1;

        if f_reflected < best {
            let expanded: Vec<f64> = (0..n).map(|k| centroid[k] + 2.0 * (reflected[k] - centroid[k])).collect();
            let f_expanded = eval(&expanded);
            evaluations += 1;
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < second_worst {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            let contracted: Vec<f64> =
                (0..n).map(|k| centroid[k] + 0.5 * (simplex[n][k] - centroid[k])).collect();
            let f_contracted = eval(&contracted);
            evaluations += 1;
            if f_contracted < worst {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                for i in 1..=n {
                    for k in 0..n {
                        simplex[i][k] = simplex[0][k] + 0.5 * (simplex[i][k] - simplex[0][k]);
                    }
                    values[i] = eval(&simplex[i]);
                    evaluations += 1;
                }
            }
        }
    }
}

fn pattern_search(x0: Vec<f64>, step0: f64, max_evaluations: usize, eval: &mut impl FnMut(&[f64]) -> f64) {
    let n = x0.len();
    if n == 0 {
        return;
    }
    let mut x = x0;
    let mut best = eval(&x);
    let mut step = step0;
    let mut evaluations = 1;

    while step > 1e-4 && evaluations < max_evaluations {
        let mut improved = false;
        'dims: for j in 0..n {
            for &delta in &[step, -step] {
                let mut candidate = x.clone();
                candidate[j] += delta;
                let value = eval(&candidate);
                evaluations += 1;
                if value < best {
                    best = value;
                    x = candidate;
                    improved = true;
                }
                if evaluations >= max_evaluations {
                    break 'dims;
                }
            }
        }
        if !improved {
            step *= 0.5;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reranker::corpus::RerankParse;

    fn toy_corpus() -> Vec<RerankSentence> {
        vec![RerankSentence {
            gold_edges: 1.0,
            px: 1.0,
            correct_index: 0,
            parses: vec![
                RerankParse { features: vec![(0, 1.0)], p_edges: 1.0, w_correct: 1.0, pyx: 1.0 },
                RerankParse { features: vec![(0, 0.2)], p_edges: 1.0, w_correct: 0.0, pyx: 0.0 },
            ],
        }]
    }

    #[test]
    fn search_returns_a_weight_vector_that_improves_on_zero() {
        let train = toy_corpus();
        let dev = toy_corpus();
        let regularizer = Regularizer::flat(1);
        let config = CvConfig { max_evaluations: 40, ..CvConfig::default() };
        let result = search(&train, &dev, LossId::LogLoss, &regularizer, 1, 1.0, &config);

        let dev_loss = loss::make_loss(LossId::LogLoss, &dev);
        let mut grad = vec![0.0; 1];
        let mut stats = PrStats::default();
        let zero_value = dev_loss.evaluate(&[0.0], &mut grad, &mut stats);
        assert!(result.dev_value <= zero_value + 1e-9);
    }
}
