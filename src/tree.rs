use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary regression tree stored as a node arena, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    at = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_child_weight: f64,
    /// L2 penalty on leaf values.
    pub lambda: f64,
    /// Features considered per split; `None` tries all of them.
    pub max_features: Option<usize>,
}

/// Checks shape, finiteness and labels; returns the feature count.
pub fn validate(x: &[Vec<f64>], y: &[u8]) -> Result<usize, TrainError> {
    if x.is_empty() {
        return Err(TrainError::Empty);
    }
    if x.len() != y.len() {
        return Err(TrainError::LengthMismatch {
            rows: x.len(),
            targets: y.len(),
        });
    }
    let width = x[0].len();
    for (row, values) in x.iter().enumerate() {
        if values.len() != width {
            return Err(TrainError::RaggedRow {
                row,
                got: values.len(),
                expected: width,
            });
        }
        if let Some(column) = values.iter().position(|v| !v.is_finite()) {
            return Err(TrainError::NonFinite { row, column });
        }
    }
    if let Some(bad) = y.iter().find(|&&t| t > 1) {
        return Err(TrainError::BadLabel(*bad));
    }
    Ok(width)
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Second-order tree growth shared by both ensembles.
///
/// With `hess` all ones and `lambda` zero the gain is the squared-error
/// reduction, which on 0/1 targets ranks splits the same way as Gini.
pub struct TreeGrower<'a, R: Rng> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: TreeParams,
    rng: &'a mut R,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

impl<'a, R: Rng> TreeGrower<'a, R> {
    pub fn new(
        x: &'a [Vec<f64>],
        grad: &'a [f64],
        hess: &'a [f64],
        params: TreeParams,
        rng: &'a mut R,
    ) -> Self {
        let width = x.first().map(Vec::len).unwrap_or(0);
        Self {
            x,
            grad,
            hess,
            params,
            rng,
            nodes: Vec::new(),
            gains: vec![0.0; width],
        }
    }

    /// Grows one tree on `sample` (row indices, repeats allowed) and returns it
    /// with the total split gain credited to each feature.
    pub fn grow(mut self, sample: Vec<usize>) -> (Tree, Vec<f64>) {
        self.build(sample, 0);
        (Tree { nodes: self.nodes }, self.gains)
    }

    fn sums(&self, idx: &[usize]) -> (f64, f64) {
        idx.iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }

    fn build(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let (g, h) = self.sums(&idx);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: leaf_value(g, h, self.params.lambda),
        });

        let depth_left = self.params.max_depth.is_none_or(|max| depth < max);
        if !depth_left || idx.len() < self.params.min_samples_split.max(2) {
            return id;
        }
        let Some(choice) = self.best_split(&idx, g, h) else {
            return id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.x[i][choice.feature] <= choice.threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return id;
        }
        self.gains[choice.feature] += choice.gain;
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[id] = Node::Split {
            feature: choice.feature,
            threshold: choice.threshold,
            left,
            right,
        };
        id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let width = self.gains.len();
        match self.params.max_features {
            Some(k) if k < width => index::sample(&mut *self.rng, width, k.max(1)).into_vec(),
            _ => (0..width).collect(),
        }
    }

    fn best_split(&mut self, idx: &[usize], g: f64, h: f64) -> Option<SplitChoice> {
        let lambda = self.params.lambda;
        let parent = score(g, h, lambda);
        let mut best: Option<SplitChoice> = None;
        let mut order = idx.to_vec();

        for feature in self.candidate_features() {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                gl += self.grad[i];
                hl += self.hess[i];
                let here = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if here == next {
                    continue;
                }
                let hr = h - hl;
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = score(gl, hl, lambda) + score(g - gl, hr, lambda) - parent;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some(SplitChoice {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 { 0.0 } else { g * g / denom }
}

fn leaf_value(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 { 0.0 } else { g / denom }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_child_weight: 0.0,
            lambda: 0.0,
            max_features: None,
        }
    }

    #[test]
    fn separable_data_gives_pure_leaves() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![f64::from(i), 0.0]).collect();
        let y: Vec<f64> = (0..8).map(|i| if i < 4 { 0.0 } else { 1.0 }).collect();
        let ones = vec![1.0; 8];
        let mut rng = StdRng::seed_from_u64(1);
        let (tree, gains) =
            TreeGrower::new(&x, &y, &ones, params(), &mut rng).grow((0..8).collect());
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[2.0, 0.0]), 0.0);
        assert_eq!(tree.predict(&[3.6, 0.0]), 1.0);
        assert!(gains[0] > 0.0);
        assert_eq!(gains[1], 0.0);
    }

    #[test]
    fn max_depth_zero_is_a_stump_leaf() {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![0.0, 1.0];
        let ones = vec![1.0; 2];
        let mut rng = StdRng::seed_from_u64(1);
        let p = TreeParams {
            max_depth: Some(0),
            ..params()
        };
        let (tree, _) = TreeGrower::new(&x, &y, &ones, p, &mut rng).grow(vec![0, 1]);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[5.0]), 0.5);
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert_eq!(validate(&[], &[]), Err(TrainError::Empty));
        assert_eq!(
            validate(&[vec![1.0], vec![1.0, 2.0]], &[0, 1]),
            Err(TrainError::RaggedRow {
                row: 1,
                got: 2,
                expected: 1
            })
        );
        assert_eq!(
            validate(&[vec![f64::NAN]], &[0]),
            Err(TrainError::NonFinite { row: 0, column: 0 })
        );
        assert_eq!(validate(&[vec![1.0]], &[2]), Err(TrainError::BadLabel(2)));
        assert_eq!(validate(&[vec![1.0, 2.0]], &[1]), Ok(2));
    }
}
