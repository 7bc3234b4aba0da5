use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::forest::normalize;
use crate::tree::{Tree, TreeGrower, TreeParams, validate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub lambda: f64,
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

/// Logistic-loss gradient boosting with Newton leaf steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosted {
    pub params: BoostingParams,
    base_score: f64,
    trees: Vec<Tree>,
    importance: Vec<f64>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoosted {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: BoostingParams) -> Result<Self, TrainError> {
        let width = validate(x, y)?;
        let n = x.len();
        let positives = y.iter().filter(|&&t| t == 1).count() as f64;
        let rate = (positives / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (rate / (1.0 - rate)).ln();

        let tree_params = TreeParams {
            max_depth: Some(params.max_depth),
            min_samples_split: 2,
            min_child_weight: params.min_child_weight,
            lambda: params.lambda,
            max_features: None,
        };
        // all features are tried at every split, so the generator is never drawn from
        let mut rng = StdRng::seed_from_u64(0);
        let mut margin = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importance = vec![0.0; width];
        let sample: Vec<usize> = (0..n).collect();

        for _ in 0..params.n_estimators {
            let mut grad = Vec::with_capacity(n);
            let mut hess = Vec::with_capacity(n);
            for (m, &t) in margin.iter().zip(y) {
                let p = sigmoid(*m);
                grad.push(f64::from(t) - p);
                hess.push((p * (1.0 - p)).max(1e-12));
            }
            let (tree, gains) =
                TreeGrower::new(x, &grad, &hess, tree_params, &mut rng).grow(sample.clone());
            for (acc, g) in importance.iter_mut().zip(&gains) {
                *acc += g;
            }
            for (m, row) in margin.iter_mut().zip(x) {
                *m += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }
        normalize(&mut importance);

        Ok(Self {
            params,
            base_score,
            trees,
            importance,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let margin = self.trees.iter().fold(self.base_score, |acc, t| {
            acc + self.params.learning_rate * t.predict(row)
        });
        sigmoid(margin)
    }

    /// Total split gain per feature, normalized to sum to 1.
    pub fn feature_importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
