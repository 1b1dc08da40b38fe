//! The smoothed conditional rule-probability model: a back-off trie of
//! feature histories, consulted by the chart parser at every edge-extension
//! and edge-completion step.

pub mod calc;
pub mod lambda;
pub mod trie;
pub mod unknown;

use crate::error::ConfigError;
use calc::{CalcClass, History};
use lambda::LambdaTables;
use log_domain::LogDomain;
use num_traits::Zero;
use std::collections::HashMap;
use std::path::Path;
use trie::FeatureTree;
pub use unknown::UnknownWordModel;

/// Probability floor returned for an event the trie never observed.
const FLOOR: f64 = 1e-10;

struct CalcModel {
    tree: FeatureTree,
    lambdas: LambdaTables,
}

pub struct SmoothedModel {
    calcs: HashMap<CalcClass, CalcModel>,
    pub unknown: UnknownWordModel,
}

impl SmoothedModel {
    pub fn load(model_dir: &Path) -> Result<SmoothedModel, ConfigError> {
        let mut calcs = HashMap::new();
        for &class in CalcClass::ALL.iter() {
            let g_path = model_dir.join(format!("{}.g", class.file_stem()));
            let lambda_path = model_dir.join(format!("{}.lambdas", class.file_stem()));
            let g_text = std::fs::read_to_string(&g_path)
                .map_err(|_| ConfigError::MissingFile(g_path.clone()))?;
            let lambda_text = std::fs::read_to_string(&lambda_path)
                .map_err(|_| ConfigError::MissingFile(lambda_path.clone()))?;
            let tree = FeatureTree::parse(&g_text).map_err(|reason| ConfigError::CorruptFile {
                path: g_path,
                reason,
            })?;
            let mut lambdas = LambdaTables::default();
            lambdas.insert(
                class,
                lambda::LambdaTable::parse(&lambda_text).map_err(|reason| {
                    ConfigError::CorruptFile { path: lambda_path, reason }
                })?,
            );
            calcs.insert(class, CalcModel { tree, lambdas });
        }

        let unknown = UnknownWordModel::load(
            &model_dir.join("pUgT.txt"),
            &model_dir.join("endings.txt"),
        )?;

        Ok(SmoothedModel { calcs, unknown })
    }

    /// `p(event | history)` for the given calculation class. Walks the
    /// trie from the root (most general context) downward, combining the
    /// empirical estimate at each level with the one from the level below
    /// via the class's lambda table. Backs off by simply stopping when the
    /// trie has no child for the next sub-feature's value.
    pub fn prob(&self, class: CalcClass, event: u32, history: &History) -> LogDomain<f64> {
        let Some(model) = self.calcs.get(&class) else {
            return LogDomain::new(FLOOR).unwrap();
        };

        let subfeatures = class.subfeatures();
        let mut node = model.tree.root();
        let mut estimate = model.tree.node(node).mle(event).max(FLOOR);

        for (depth, &sub) in subfeatures.iter().enumerate() {
            let Some(key) = history.value(sub) else {
                break;
            };
            let Some(child) = model.tree.node(node).child(key) else {
                break;
            };
            node = child;
            let local = model.tree.node(node).mle(event);
            let lambda = model.lambdas.get(class, depth, model.tree.node(node).count);
            estimate = lambda * local + (1.0 - lambda) * estimate;
        }

        LogDomain::new(estimate.clamp(FLOOR, 1.0)).unwrap_or_else(|_| LogDomain::zero())
    }

    /// A model with no trained calculation classes at all; every query
    /// falls back to the floor probability. Useful for exercising the chart
    /// parser's control flow independent of any particular trained model.
    #[cfg(test)]
    pub fn test_stub() -> SmoothedModel {
        SmoothedModel {
            calcs: HashMap::new(),
            unknown: UnknownWordModel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc::History;

    fn toy_model() -> SmoothedModel {
        let mut calcs = HashMap::new();
        // root: event 3 seen 2/3, event 4 seen 1/3.
        // child keyed on parent_category = 7: event 3 seen 9/10.
        let g = "\n|0|3=2 4=1\n7|3|3=9 4=1\n";
        let lambdas = "0 0 0.1\n0 1 0.1\n1 0 0.9\n1 1 0.9\n";
        let tree = FeatureTree::parse(g).unwrap();
        let mut lt = LambdaTables::default();
        lt.insert(CalcClass::Rule, lambda::LambdaTable::parse(lambdas).unwrap());
        calcs.insert(CalcClass::Rule, CalcModel { tree, lambdas: lt });
        SmoothedModel {
            calcs,
            unknown: UnknownWordModel::default(),
        }
    }

    #[test]
    fn backs_off_when_history_has_no_matching_child() {
        let model = toy_model();
        let mut history = History::default();
        history.parent_category = Some(42); // no such child
        let p = model.prob(CalcClass::Rule, 3, &history);
        let expected = LogDomain::new(2.0 / 3.0).unwrap();
        assert!(p > expected / LogDomain::new(1.000001).unwrap());
        assert!(p < expected * LogDomain::new(1.000001).unwrap());
    }

    #[test]
    fn interpolates_toward_specific_context() {
        let model = toy_model();
        let mut history = History::default();
        history.parent_category = Some(7);
        let p = model.prob(CalcClass::Rule, 3, &history);
        // lambda = 0.9 at depth 0 pulls the estimate toward the specific 9/10.
        assert!(p > LogDomain::new(0.8).unwrap());
    }

    #[test]
    fn unknown_event_hits_floor() {
        let model = toy_model();
        let history = History::default();
        let p = model.prob(CalcClass::Rule, 999, &history);
        assert!(p <= LogDomain::new(1e-3).unwrap());
    }
}
