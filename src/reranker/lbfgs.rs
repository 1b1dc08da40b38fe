//! A from-scratch limited-memory quasi-Newton optimizer for the
//! regularized objective `Q(w) = L(w) + Σ_j c[class(j)] |w_j − w0_j|^p`.
//! Ordinary two-loop-recursion L-BFGS handles `p != 1`; an OWL-QN variant
//! (pseudo-gradient direction, orthant-constrained line search) handles
//! `p == 1`, so L1 coefficients reach exact zero instead of merely
//! shrinking toward it. History depth defaults to 15, matching
//! `cvlm-lbfgs`'s inner-optimizer memory setting.

use crate::reranker::loss::{Loss, PrStats};
use crate::reranker::regularizer::Regularizer;

#[derive(Debug, Clone)]
pub struct LbfgsConfig {
    pub history: usize,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        LbfgsConfig {
            history: 15,
            tolerance: 1e-6,
            max_iterations: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub weights: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub stats: PrStats,
}

/// Bundles the loss being minimized with the regularizer penalty added on
/// top of it. `center` is the point the penalty is measured from (empty
/// means zero for every feature).
pub struct RegularizedObjective<'a> {
    pub loss: &'a dyn Loss,
    pub regularizer: &'a Regularizer,
    pub c: Vec<f64>,
    pub power: f64,
    pub center: Vec<f64>,
}

impl<'a> RegularizedObjective<'a> {
    fn center_vec(&self, n: usize) -> Vec<f64> {
        if self.center.is_empty() {
            vec![0.0; n]
        } else {
            self.center.clone()
        }
    }

    fn smooth(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        self.loss.evaluate(w, grad, stats)
    }

    fn value_and_grad(&self, w: &[f64], grad: &mut [f64], stats: &mut PrStats) -> f64 {
        let loss_value = self.loss.evaluate(w, grad, stats);
        let center = self.center_vec(w.len());
        let penalty = self.regularizer.penalty(w, &center, &self.c, self.power, grad);
        loss_value + penalty
    }

    fn value_only(&self, w: &[f64]) -> f64 {
        let mut scratch_grad = vec![0.0; w.len()];
        let mut scratch_stats = PrStats::default();
        let loss_value = self.loss.evaluate(w, &mut scratch_grad, &mut scratch_stats);
        let center = self.center_vec(w.len());
        let mut penalty_grad = vec![0.0; w.len()];
        let penalty = self
            .regularizer
            .penalty(w, &center, &self.c, self.power, &mut penalty_grad);
        loss_value + penalty
    }
}

pub fn minimize(objective: &RegularizedObjective, w0: Vec<f64>, config: &LbfgsConfig) -> Solution {
    if objective.power == 1.0 {
        owlqn(objective, w0, config)
    } else {
        lbfgs(objective, w0, config)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn two_loop_direction(
    grad: &[f64],
    s_hist: &[Vec<f64>],
    y_hist: &[Vec<f64>],
    rho_hist: &[f64],
) -> Vec<f64> {
    let mut q = grad.to_vec();
    let k = s_hist.len();
    let mut alpha = vec![0.0; k];
    for i in (0..k).rev() {
        alpha[i] = rho_hist[i] * dot(&s_hist[i], &q);
        for (qi, yi) in q.iter_mut().zip(&y_hist[i]) {
            *qi -= alpha[i] * yi;
        }
    }
    let gamma = if k > 0 {
        let sy = dot(&s_hist[k - 1], &y_hist[k - 1]);
        let yy = dot(&y_hist[k - 1], &y_hist[k - 1]);
        if yy > 0.0 {
            sy / yy
        } else {
            1.0
        }
    } else {
        1.0
    };
    for qi in q.iter_mut() {
        *qi *= gamma;
    }
    for i in 0..k {
        let beta = rho_hist[i] * dot(&y_hist[i], &q);
        for (qi, si) in q.iter_mut().zip(&s_hist[i]) {
            *qi += (alpha[i] - beta) * si;
        }
    }
    for qi in q.iter_mut() {
        *qi = -*qi;
    }
    q
}

fn push_history(
    s_hist: &mut Vec<Vec<f64>>,
    y_hist: &mut Vec<Vec<f64>>,
    rho_hist: &mut Vec<f64>,
    s: Vec<f64>,
    y: Vec<f64>,
    limit: usize,
) {
    let sy = dot(&s, &y);
    if sy <= 1e-12 {
        return;
    }
    s_hist.push(s);
    y_hist.push(y);
    rho_hist.push(1.0 / sy);
    if s_hist.len() > limit {
        s_hist.remove(0);
        y_hist.remove(0);
        rho_hist.remove(0);
    }
}

fn lbfgs(objective: &RegularizedObjective, w0: Vec<f64>, config: &LbfgsConfig) -> Solution {
    let n = w0.len();
    let mut x = w0;
    let mut grad = vec![0.0; n];
    let mut stats = PrStats::default();
    let mut fx = objective.value_and_grad(&x, &mut grad, &mut stats);

    let mut s_hist = Vec::new();
    let mut y_hist = Vec::new();
    let mut rho_hist = Vec::new();
    let mut iterations = 0;

    while iterations < config.max_iterations {
        if norm(&grad) < config.tolerance {
            break;
        }
        let direction = two_loop_direction(&grad, &s_hist, &y_hist, &rho_hist);
        let directional_derivative = dot(&grad, &direction);
        let c1 = 1e-4;
        let mut alpha = 1.0;
        let (x_new, grad_new, fx_new, stats_new) = loop {
            let candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(&xi, &di)| xi + alpha * di)
                .collect();
            let mut g = vec![0.0; n];
            let mut s = PrStats::default();
            let value = objective.value_and_grad(&candidate, &mut g, &mut s);
            if value <= fx + c1 * alpha * directional_derivative || alpha < 1e-12 {
                break (candidate, g, value, s);
            }
            alpha *= 0.5;
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(&a, &b)| a - b).collect();
        let y: Vec<f64> = grad_new.iter().zip(&grad).map(|(&a, &b)| a - b).collect();
        push_history(&mut s_hist, &mut y_hist, &mut rho_hist, s, y, config.history);

        let relative = (fx - fx_new).abs() / fx.abs().max(1.0);
        x = x_new;
        grad = grad_new;
        stats = stats_new;
        fx = fx_new;
        iterations += 1;
        if relative < config.tolerance {
            break;
        }
    }

    Solution {
        weights: x,
        value: fx,
        iterations,
        stats,
    }
}

/// `∂|w_j − w0_j| / ∂w_j` where it exists, and the minimum-norm
/// subgradient at the kink where it doesn't (Andrew & Gao's OWL-QN).
fn pseudo_gradient(
    w: &[f64],
    center: &[f64],
    loss_grad: &[f64],
    regularizer: &Regularizer,
    c: &[f64],
) -> Vec<f64> {
    w.iter()
        .zip(loss_grad)
        .enumerate()
        .map(|(j, (&wj, &gj))| {
            let cj = c.get(regularizer.class_of(j)).copied().unwrap_or(0.0);
            let d = wj - center.get(j).copied().unwrap_or(0.0);
            if d > 0.0 {
                gj + cj
            } else if d < 0.0 {
                gj - cj
            } else if gj + cj < 0.0 {
                gj + cj
            } else if gj - cj > 0.0 {
                gj - cj
            } else {
                0.0
            }
        })
        .collect()
}

fn project_direction(direction: &mut [f64], pseudo_grad: &[f64]) {
    for (d, &pg) in direction.iter_mut().zip(pseudo_grad) {
        if (*d > 0.0 && pg >= 0.0) || (*d < 0.0 && pg <= 0.0) {
            *d = 0.0;
        }
    }
}

/// Clamps each coordinate of `x_new` back to `center` if the step would
/// have crossed it, keeping the iterate in the orthant it started the
/// step in (the orthant `x_orig` was already in, falling back to the
/// pseudo-gradient's sign for coordinates sitting exactly at `center`).
fn orthant_project(x_new: &mut [f64], x_orig: &[f64], center: &[f64], pseudo_grad: &[f64]) {
    for (j, xn) in x_new.iter_mut().enumerate() {
        let c = center.get(j).copied().unwrap_or(0.0);
        let orig_d = x_orig[j] - c;
        let orthant_sign = if orig_d != 0.0 {
            orig_d.signum()
        } else {
            -pseudo_grad[j].signum()
        };
        if (*xn - c) * orthant_sign < 0.0 {
            *xn = c;
        }
    }
}

fn owlqn(objective: &RegularizedObjective, w0: Vec<f64>, config: &LbfgsConfig) -> Solution {
    let n = w0.len();
    let center = objective.center_vec(n);
    let mut x = w0;
    let mut smooth_grad = vec![0.0; n];
    let mut stats = PrStats::default();
    objective.smooth(&x, &mut smooth_grad, &mut stats);
    let mut pseudo = pseudo_gradient(&x, &center, &smooth_grad, objective.regularizer, &objective.c);
    let mut fx = objective.value_only(&x);

    let mut s_hist = Vec::new();
    let mut y_hist = Vec::new();
    let mut rho_hist = Vec::new();
    let mut iterations = 0;

    while iterations < config.max_iterations {
        if norm(&pseudo) < config.tolerance {
            break;
        }
        let mut direction = two_loop_direction(&pseudo, &s_hist, &y_hist, &rho_hist);
        project_direction(&mut direction, &pseudo);
        if norm(&direction) == 0.0 {
            break;
        }

        let directional_derivative = dot(&pseudo, &direction);
        let c1 = 1e-4;
        let mut alpha = 1.0;
        let (x_new, fx_new) = loop {
            let mut candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(&xi, &di)| xi + alpha * di)
                .collect();
            orthant_project(&mut candidate, &x, &center, &pseudo);
            let value = objective.value_only(&candidate);
            if value <= fx + c1 * alpha * directional_derivative || alpha < 1e-12 {
                break (candidate, value);
            }
            alpha *= 0.5;
        };

        let mut smooth_grad_new = vec![0.0; n];
        let mut stats_new = PrStats::default();
        objective.smooth(&x_new, &mut smooth_grad_new, &mut stats_new);
        let pseudo_new =
            pseudo_gradient(&x_new, &center, &smooth_grad_new, objective.regularizer, &objective.c);

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(&a, &b)| a - b).collect();
        let y: Vec<f64> = smooth_grad_new
            .iter()
            .zip(&smooth_grad)
            .map(|(&a, &b)| a - b)
            .collect();
        push_history(&mut s_hist, &mut y_hist, &mut rho_hist, s, y, config.history);

        let relative = (fx - fx_new).abs() / fx.abs().max(1.0);
        x = x_new;
        smooth_grad = smooth_grad_new;
        pseudo = pseudo_new;
        stats = stats_new;
        fx = fx_new;
        iterations += 1;
        if relative < config.tolerance {
            break;
        }
    }

    Solution {
        weights: x,
        value: fx,
        iterations,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct QuadraticLoss {
        target: Vec<f64>,
    }

    impl Loss for QuadraticLoss {
        fn evaluate(&self, w: &[f64], grad: &mut [f64], _stats: &mut PrStats) -> f64 {
            let mut total = 0.0;
            for (j, (&wj, &tj)) in w.iter().zip(&self.target).enumerate() {
                let d = wj - tj;
                total += d * d;
                grad[j] += 2.0 * d;
            }
            total
        }
    }

    #[test]
    fn lbfgs_converges_to_unregularized_minimum() {
        let loss = QuadraticLoss { target: vec![3.0, -2.0] };
        let regularizer = Regularizer::flat(2);
        let objective = RegularizedObjective {
            loss: &loss,
            regularizer: &regularizer,
            c: vec![0.0],
            power: 2.0,
            center: vec![],
        };
        let config = LbfgsConfig { tolerance: 1e-10, ..LbfgsConfig::default() };
        let solution = minimize(&objective, vec![0.0, 0.0], &config);
        assert!((solution.weights[0] - 3.0).abs() < 1e-3);
        assert!((solution.weights[1] + 2.0).abs() < 1e-3);
    }

    #[test]
    fn owlqn_drives_small_feature_to_exact_zero() {
        let loss = QuadraticLoss { target: vec![0.01, 5.0] };
        let regularizer = Regularizer::flat(2);
        let objective = RegularizedObjective {
            loss: &loss,
            regularizer: &regularizer,
            c: vec![1.0],
            power: 1.0,
            center: vec![],
        };
        let config = LbfgsConfig { tolerance: 1e-10, ..LbfgsConfig::default() };
        let solution = minimize(&objective, vec![0.0, 0.0], &config);
        assert_eq!(solution.weights[0], 0.0);
        assert!(solution.weights[1] > 1.0);
    }
}
