use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::tree::{Tree, TreeGrower, TreeParams, validate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            min_samples_split: 10,
            max_depth: None,
            bootstrap: true,
            seed: 1,
        }
    }
}

/// Bagged trees averaged into a win probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    trees: Vec<Tree>,
    importance: Vec<f64>,
}

impl RandomForest {
    /// Tree `i` draws from its own generator seeded with `seed + i`, so the
    /// result does not depend on how rayon schedules the work.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: ForestParams) -> Result<Self, TrainError> {
        let width = validate(x, y)?;
        let target: Vec<f64> = y.iter().map(|&t| f64::from(t)).collect();
        let ones = vec![1.0; x.len()];
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_child_weight: 0.0,
            lambda: 0.0,
            max_features: Some(((width as f64).sqrt().round() as usize).max(1)),
        };

        let grown: Vec<(Tree, Vec<f64>)> = (0..params.n_estimators.max(1))
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let n = x.len();
                let sample: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                TreeGrower::new(x, &target, &ones, tree_params, &mut rng).grow(sample)
            })
            .collect();

        let mut importance = vec![0.0; width];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, gains) in grown {
            let total: f64 = gains.iter().sum();
            if total > 0.0 {
                for (acc, g) in importance.iter_mut().zip(&gains) {
                    *acc += g / total;
                }
            }
            trees.push(tree);
        }
        normalize(&mut importance);

        Ok(Self {
            params,
            trees,
            importance,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    /// Mean decrease in impurity per feature, summing to 1 unless no tree split.
    pub fn feature_importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let signal = f64::from(i % 10);
            let noise = f64::from((i * 7) % 5);
            x.push(vec![signal, noise]);
            y.push(u8::from(signal >= 5.0));
        }
        (x, y)
    }

    #[test]
    fn learns_threshold_and_ranks_signal_first() {
        let (x, y) = toy();
        let forest = RandomForest::fit(
            &x,
            &y,
            ForestParams {
                n_estimators: 25,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(forest.n_trees(), 25);
        assert!(forest.predict_proba(&[8.0, 1.0]) > 0.8);
        assert!(forest.predict_proba(&[1.0, 1.0]) < 0.2);
        let imp = forest.feature_importance();
        assert!(imp[0] > imp[1]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let (x, y) = toy();
        let p = ForestParams {
            n_estimators: 8,
            seed: 42,
            ..Default::default()
        };
        let a = RandomForest::fit(&x, &y, p).unwrap();
        let b = RandomForest::fit(&x, &y, p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_matrix_is_an_error() {
        assert_eq!(
            RandomForest::fit(&[], &[], ForestParams::default()),
            Err(TrainError::Empty)
        );
    }
}
