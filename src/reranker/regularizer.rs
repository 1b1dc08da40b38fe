//! Feature-class binning for the regularizer. Every feature carries a
//! string identifier (e.g. `word:cat:NN`); features are grouped into a
//! regularizer class by truncating that identifier to its first
//! `feature_class_depth` colon-separated segments, so `word:cat:NN` and
//! `word:cat:VB` share a coefficient while `rule:S->NP_VP` gets its own.
//!
//! Feature ids themselves are plain integers (see [`crate::reranker::corpus`]);
//! the string identifiers they were assigned from live in a feature-id file
//! read alongside the corpus, one identifier per line in id order.

use std::collections::HashMap;

/// Maps each feature id to a small dense class id, and each class to a
/// single regularizer coefficient shared by every feature in it.
#[derive(Debug, Clone)]
pub struct Regularizer {
    class_of: Vec<u32>,
    nclasses: usize,
}

impl Regularizer {
    /// `identifiers[i]` is the string identifier of feature id `i`.
    /// `depth` is the number of leading colon-separated segments used as
    /// the class key (0 means every feature shares one global class).
    pub fn new(identifiers: &[String], depth: usize) -> Regularizer {
        let mut class_ids: HashMap<String, u32> = HashMap::new();
        let mut class_of = Vec::with_capacity(identifiers.len());
        for ident in identifiers {
            let key = class_key(ident, depth);
            let next = class_ids.len() as u32;
            let class = *class_ids.entry(key).or_insert(next);
            class_of.push(class);
        }
        Regularizer {
            nclasses: class_ids.len(),
            class_of,
        }
    }

    /// A regularizer with a single class covering every feature, used when
    /// no feature-identifier file is available.
    pub fn flat(nfeatures: usize) -> Regularizer {
        Regularizer {
            class_of: vec![0; nfeatures],
            nclasses: 1,
        }
    }

    pub fn nclasses(&self) -> usize {
        self.nclasses.max(1)
    }

    pub fn class_of(&self, feature: usize) -> usize {
        self.class_of.get(feature).copied().unwrap_or(0) as usize
    }

    /// `Σ_j c[class(j)] · |w_j − w0_j|^p` and its gradient, added into
    /// `grad` in place. `w0` is the center the penalty is measured from
    /// (zero for ordinary L1/L2, a previous solution for incremental
    /// retraining).
    pub fn penalty(&self, w: &[f64], w0: &[f64], c: &[f64], p: f64, grad: &mut [f64]) -> f64 {
        let mut total = 0.0;
        for (j, &wj) in w.iter().enumerate() {
            let class = self.class_of(j);
            let cj = c.get(class).copied().unwrap_or(0.0);
            if cj == 0.0 {
                continue;
            }
            let center = w0.get(j).copied().unwrap_or(0.0);
            let d = wj - center;
            if p == 1.0 {
                total += cj * d.abs();
                // Subgradient; the L1 kink itself is handled by OWL-QN in
                // the optimizer, not here.
                grad[j] += cj * d.signum();
            } else {
                let ad = d.abs();
                total += cj * ad.powf(p);
                if ad > 0.0 {
                    grad[j] += cj * p * ad.powf(p - 1.0) * d.signum();
                }
            }
        }
        total
    }
}

fn class_key(identifier: &str, depth: usize) -> String {
    if depth == 0 {
        return String::new();
    }
    identifier
        .splitn(depth + 1, ':')
        .take(depth)
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_leading_colon_segments() {
        let ids = vec![
            "word:cat:NN".to_string(),
            "word:cat:VB".to_string(),
            "rule:S-NP_VP".to_string(),
        ];
        let reg = Regularizer::new(&ids, 2);
        assert_eq!(reg.class_of(0), reg.class_of(1));
        assert_ne!(reg.class_of(0), reg.class_of(2));
        assert_eq!(reg.nclasses(), 2);
    }

    #[test]
    fn depth_zero_puts_everything_in_one_class() {
        let ids = vec!["a:b".to_string(), "c:d:e".to_string()];
        let reg = Regularizer::new(&ids, 0);
        assert_eq!(reg.class_of(0), reg.class_of(1));
        assert_eq!(reg.nclasses(), 1);
    }

    #[test]
    fn l1_penalty_gradient_is_signed_coefficient() {
        let reg = Regularizer::flat(2);
        let w = [2.0, -3.0];
        let w0 = [0.0, 0.0];
        let c = [0.5];
        let mut grad = vec![0.0; 2];
        let value = reg.penalty(&w, &w0, &c, 1.0, &mut grad);
        assert!((value - 0.5 * (2.0 + 3.0)).abs() < 1e-9);
        assert!((grad[0] - 0.5).abs() < 1e-9);
        assert!((grad[1] - (-0.5)).abs() < 1e-9);
    }
}
