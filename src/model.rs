use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::boosting::{BoostingParams, GradientBoosted};
use crate::error::{ModelStateError, TrainError};
use crate::forest::{ForestParams, RandomForest};
use crate::metrics::{BinaryMetrics, evaluate_binary, predicted_label};

pub const UNVERSIONED: &str = "unversioned";
pub const PLACEHOLDER_FEATURE: &str = "No Features";
pub const PLACEHOLDER_IMPORTANCE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    RandomForest,
    Ensemble,
}

impl ModelKind {
    pub fn tag(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "randomforest",
            ModelKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "randomforest" | "rf" => Ok(ModelKind::RandomForest),
            "ensemble" => Ok(ModelKind::Ensemble),
            other => Err(format!("unknown model kind '{other}'")),
        }
    }
}

/// Blend weights for the ensemble. Used as given: they are not rescaled to sum to 1,
/// so unnormalized weights scale probabilities and importances proportionally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub forest: f64,
    pub boosted: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            forest: 0.5,
            boosted: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub weights: EnsembleWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Learner {
    Forest(RandomForest),
    Ensemble {
        forest: RandomForest,
        boosted: GradientBoosted,
        weights: EnsembleWeights,
    },
}

impl Learner {
    fn win_probability(&self, row: &[f64]) -> f64 {
        match self {
            Learner::Forest(forest) => forest.predict_proba(row),
            Learner::Ensemble {
                forest,
                boosted,
                weights,
            } => weights.forest * forest.predict_proba(row) + weights.boosted * boosted.predict_proba(row),
        }
    }

    fn importance(&self) -> Vec<f64> {
        match self {
            Learner::Forest(forest) => forest.feature_importance().to_vec(),
            Learner::Ensemble {
                forest,
                boosted,
                weights,
            } => forest
                .feature_importance()
                .iter()
                .zip(boosted.feature_importance())
                .map(|(f, b)| weights.forest * f + weights.boosted * b)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub overall: BinaryMetrics,
    pub forest_accuracy: Option<f64>,
    pub forest_auc: Option<f64>,
    pub boosted_accuracy: Option<f64>,
    pub boosted_auc: Option<f64>,
}

impl ModelMetrics {
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let o = &self.overall;
        let mut out = BTreeMap::from([
            ("accuracy".to_string(), o.accuracy),
            ("precision".to_string(), o.precision),
            ("recall".to_string(), o.recall),
            ("f1".to_string(), o.f1),
            ("auc".to_string(), o.auc),
            ("brier".to_string(), o.brier),
            ("log_loss".to_string(), o.log_loss),
            ("samples".to_string(), o.samples as f64),
        ]);
        for (name, value) in [
            ("forest_accuracy", self.forest_accuracy),
            ("forest_auc", self.forest_auc),
            ("boosted_accuracy", self.boosted_accuracy),
            ("boosted_auc", self.boosted_auc),
        ] {
            if let Some(v) = value {
                out.insert(name.to_string(), v);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelState {
    Untrained,
    Trained(Learner),
    Evaluated {
        learner: Learner,
        metrics: ModelMetrics,
    },
}

/// A classifier plus the exact predictor order it was trained on.
///
/// Untrained models answer every query with a neutral default so callers can
/// use them without checking state first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub kind: ModelKind,
    pub predictors: Vec<String>,
    pub version: String,
    pub config: ModelConfig,
    state: ModelState,
}

impl TrainedModel {
    pub fn new(kind: ModelKind, predictors: Vec<String>, config: ModelConfig) -> Self {
        Self {
            kind,
            predictors,
            version: UNVERSIONED.to_string(),
            config,
            state: ModelState::Untrained,
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn state_label(&self) -> &'static str {
        match self.state {
            ModelState::Untrained => "untrained",
            ModelState::Trained(_) => "trained",
            ModelState::Evaluated { .. } => "evaluated",
        }
    }

    pub fn is_trained(&self) -> bool {
        !matches!(self.state, ModelState::Untrained)
    }

    fn learner(&self) -> Option<&Learner> {
        match &self.state {
            ModelState::Untrained => None,
            ModelState::Trained(learner) | ModelState::Evaluated { learner, .. } => Some(learner),
        }
    }

    pub fn metrics(&self) -> Option<&ModelMetrics> {
        match &self.state {
            ModelState::Evaluated { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    pub fn hyperparameters(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let f = &self.config.forest;
        out.insert("n_estimators".to_string(), Value::from(f.n_estimators));
        out.insert("min_samples_split".to_string(), Value::from(f.min_samples_split));
        out.insert("max_depth".to_string(), serde_json::json!(f.max_depth));
        out.insert("random_state".to_string(), Value::from(f.seed));
        if self.kind == ModelKind::Ensemble {
            let b = &self.config.boosting;
            out.insert("boosted_n_estimators".to_string(), Value::from(b.n_estimators));
            out.insert("boosted_learning_rate".to_string(), Value::from(b.learning_rate));
            out.insert("boosted_max_depth".to_string(), Value::from(b.max_depth));
            out.insert("forest_weight".to_string(), Value::from(self.config.weights.forest));
            out.insert("boosted_weight".to_string(), Value::from(self.config.weights.boosted));
        }
        out.insert(
            "predictors".to_string(),
            Value::from(self.predictors.clone()),
        );
        out
    }

    /// Fits on whatever is passed. An empty matrix leaves the model untrained
    /// and is not an error; malformed input is.
    pub fn train(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), TrainError> {
        if x.is_empty() && y.is_empty() {
            warn!(kind = %self.kind, "no training rows, model stays untrained");
            self.state = ModelState::Untrained;
            return Ok(());
        }
        let forest = RandomForest::fit(x, y, self.config.forest)?;
        let learner = match self.kind {
            ModelKind::RandomForest => Learner::Forest(forest),
            ModelKind::Ensemble => Learner::Ensemble {
                forest,
                boosted: GradientBoosted::fit(x, y, self.config.boosting)?,
                weights: self.config.weights,
            },
        };
        info!(kind = %self.kind, rows = x.len(), features = self.predictors.len(), "model trained");
        self.state = ModelState::Trained(learner);
        Ok(())
    }

    /// `[p(not win), p(win)]` per row; `[0.5, 0.5]` before training.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<[f64; 2]> {
        x.iter()
            .map(|row| {
                let p = self.learner().map(|l| l.win_probability(row)).unwrap_or(0.5);
                [1.0 - p, p]
            })
            .collect()
    }

    /// 1 when the win probability is above one half. All zeros before training.
    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<u8> {
        if !self.is_trained() {
            return vec![0; x.len()];
        }
        self.predict_proba(x)
            .into_iter()
            .map(|[_, p]| predicted_label(p))
            .collect()
    }

    /// (feature, score) sorted descending, ties by name.
    pub fn get_feature_importance(&self) -> Vec<(String, f64)> {
        let Some(learner) = self.learner() else {
            return vec![(PLACEHOLDER_FEATURE.to_string(), PLACEHOLDER_IMPORTANCE)];
        };
        let mut out: Vec<(String, f64)> = self
            .predictors
            .iter()
            .cloned()
            .zip(learner.importance())
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn evaluate(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<ModelMetrics, ModelStateError> {
        let Some(learner) = self.learner().cloned() else {
            return Err(ModelStateError::NotTrained);
        };
        if x.is_empty() || y.is_empty() {
            return Err(ModelStateError::EmptyEvaluationSet);
        }
        let probs: Vec<f64> = x.iter().map(|row| learner.win_probability(row)).collect();
        let overall = evaluate_binary(&probs, y);

        let mut metrics = ModelMetrics {
            overall,
            forest_accuracy: None,
            forest_auc: None,
            boosted_accuracy: None,
            boosted_auc: None,
        };
        if let Learner::Ensemble {
            forest, boosted, ..
        } = &learner
        {
            let fp: Vec<f64> = x.iter().map(|r| forest.predict_proba(r)).collect();
            let bp: Vec<f64> = x.iter().map(|r| boosted.predict_proba(r)).collect();
            let fm = evaluate_binary(&fp, y);
            let bm = evaluate_binary(&bp, y);
            metrics.forest_accuracy = Some(fm.accuracy);
            metrics.forest_auc = Some(fm.auc);
            metrics.boosted_accuracy = Some(bm.accuracy);
            metrics.boosted_auc = Some(bm.auc);
        }

        info!(
            kind = %self.kind,
            accuracy = metrics.overall.accuracy,
            auc = metrics.overall.auc,
            samples = metrics.overall.samples,
            "model evaluated"
        );
        self.state = ModelState::Evaluated {
            learner,
            metrics: metrics.clone(),
        };
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let x: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![f64::from(i % 20), f64::from(i % 3)])
            .collect();
        let y = x.iter().map(|r| u8::from(r[0] >= 10.0)).collect();
        (x, y)
    }

    fn small_config() -> ModelConfig {
        ModelConfig {
            forest: ForestParams {
                n_estimators: 20,
                ..Default::default()
            },
            boosting: BoostingParams {
                n_estimators: 20,
                ..Default::default()
            },
            weights: EnsembleWeights::default(),
        }
    }

    fn names() -> Vec<String> {
        vec!["signal".to_string(), "noise".to_string()]
    }

    #[test]
    fn untrained_model_is_neutral() {
        let mut model = TrainedModel::new(ModelKind::RandomForest, names(), small_config());
        assert_eq!(model.predict_proba(&[vec![1.0, 2.0]]), vec![[0.5, 0.5]]);
        assert_eq!(model.predict(&[vec![1.0, 2.0], vec![0.0, 0.0]]), vec![0, 0]);
        assert_eq!(
            model.get_feature_importance(),
            vec![("No Features".to_string(), 0.2)]
        );
        assert_eq!(
            model.evaluate(&[vec![1.0, 2.0]], &[1]),
            Err(ModelStateError::NotTrained)
        );
    }

    #[test]
    fn empty_training_keeps_model_untrained() {
        let mut model = TrainedModel::new(ModelKind::Ensemble, names(), small_config());
        model.train(&[], &[]).unwrap();
        assert_eq!(model.state_label(), "untrained");
    }

    #[test]
    fn lifecycle_reaches_evaluated() {
        let (x, y) = data();
        let mut model = TrainedModel::new(ModelKind::RandomForest, names(), small_config());
        model.train(&x, &y).unwrap();
        assert_eq!(model.state_label(), "trained");
        let importance = model.get_feature_importance();
        assert_eq!(importance[0].0, "signal");
        let metrics = model.evaluate(&x, &y).unwrap();
        assert!(metrics.overall.accuracy > 0.9);
        assert!(metrics.forest_accuracy.is_none());
        assert_eq!(model.state_label(), "evaluated");
        assert!(model.metrics().is_some());
    }

    #[test]
    fn ensemble_reports_each_learner() {
        let (x, y) = data();
        let mut model = TrainedModel::new(ModelKind::Ensemble, names(), small_config());
        model.train(&x, &y).unwrap();
        let metrics = model.evaluate(&x, &y).unwrap();
        assert!(metrics.forest_auc.is_some());
        assert!(metrics.boosted_accuracy.is_some());
        let map = metrics.to_map();
        assert!(map.contains_key("boosted_auc"));
        assert!(map.contains_key("f1"));
    }

    #[test]
    fn ensemble_weights_are_not_rescaled() {
        let (x, y) = data();
        let mut config = small_config();
        config.weights = EnsembleWeights {
            forest: 1.0,
            boosted: 1.0,
        };
        let mut model = TrainedModel::new(ModelKind::Ensemble, names(), config);
        model.train(&x, &y).unwrap();
        let total: f64 = model.get_feature_importance().iter().map(|(_, v)| v).sum();
        assert!((total - 2.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let mut model = TrainedModel::new(ModelKind::RandomForest, names(), small_config());
        assert_eq!(
            model.train(&[vec![1.0, 2.0]], &[]),
            Err(TrainError::LengthMismatch {
                rows: 1,
                targets: 0
            })
        );
    }

    #[test]
    fn kind_tags_parse() {
        assert_eq!("RandomForest".parse::<ModelKind>(), Ok(ModelKind::RandomForest));
        assert_eq!("ensemble".parse::<ModelKind>(), Ok(ModelKind::Ensemble));
        assert_eq!(ModelKind::Ensemble.to_string(), "ensemble");
    }
}
