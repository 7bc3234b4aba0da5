use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use crate::augment::augment_data;
use crate::error::Outcome;
use crate::form::DEFAULT_WINDOWS;
use crate::match_record::MatchTable;
use crate::model::{ModelConfig, ModelKind, ModelMetrics, TrainedModel};
use crate::model_data::{
    FeatureSet, ModelFrame, TrainingRow, TrainingSet, assemble_training_data, prepare_model_data,
};

pub const FALLBACK_VERSION: &str = "fallback";
pub const UNTRAINED_VERSION: &str = "untrained_default";

#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub kind: ModelKind,
    pub model: ModelConfig,
    pub feature_set: FeatureSet,
    pub windows: Vec<usize>,
    pub min_training_rows: usize,
    pub seed: u64,
    pub test_fraction: f64,
    /// Evaluation runs only when the held-out split is larger than this.
    pub min_eval_rows: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::RandomForest,
            model: ModelConfig::default(),
            feature_set: FeatureSet::Basic,
            windows: DEFAULT_WINDOWS.to_vec(),
            min_training_rows: 100,
            seed: 42,
            test_fraction: 0.2,
            min_eval_rows: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: TrainedModel,
    pub train_rows: usize,
    pub synthetic_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: usize,
    pub metrics: Option<ModelMetrics>,
}

/// Seeded shuffle split. Returns (train, test).
pub fn split_rows(
    rows: Vec<TrainingRow>,
    test_fraction: f64,
    seed: u64,
) -> (Vec<TrainingRow>, Vec<TrainingRow>) {
    let n = rows.len();
    let n_test = ((n as f64) * test_fraction.clamp(0.0, 0.9)).floor() as usize;
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut slots: Vec<Option<TrainingRow>> = rows.into_iter().map(Some).collect();
    let mut take = |i: usize| slots[i].take();
    let test: Vec<TrainingRow> = order[..n_test].iter().filter_map(|&i| take(i)).collect();
    let train: Vec<TrainingRow> = order[n_test..].iter().filter_map(|&i| take(i)).collect();
    (train, test)
}

fn matrix(rows: &[TrainingRow]) -> (Vec<Vec<f64>>, Vec<u8>) {
    (
        rows.iter().map(|r| r.features.clone()).collect(),
        rows.iter().map(|r| r.target).collect(),
    )
}

pub fn train_from_table(table: &MatchTable, config: &TrainerConfig) -> Outcome<TrainingReport> {
    let frame = prepare_model_data(table, &config.windows);
    train_from_frame(&frame, config)
}

pub fn train_from_frame(frame: &ModelFrame, config: &TrainerConfig) -> Outcome<TrainingReport> {
    let set = assemble_training_data(frame, config.feature_set);
    train_from_set(set, config)
}

/// Split, top up, fit and evaluate.
///
/// Never fails: no usable rows yields an untrained default model, and a fit
/// error yields an untrained model labelled as the fallback version.
pub fn train_from_set(set: TrainingSet, config: &TrainerConfig) -> Outcome<TrainingReport> {
    let TrainingSet {
        predictors,
        rows,
        dropped,
    } = set;
    let mut model = TrainedModel::new(config.kind, predictors, config.model);

    if rows.is_empty() {
        warn!(dropped, "no valid training rows, returning untrained default model");
        model.version = UNTRAINED_VERSION.to_string();
        return Outcome::degraded(
            TrainingReport {
                model,
                train_rows: 0,
                synthetic_rows: 0,
                test_rows: 0,
                dropped_rows: dropped,
                metrics: None,
            },
            "no valid training rows",
        );
    }

    let (train, test) = split_rows(rows, config.test_fraction, config.seed);
    let deficit = config.min_training_rows.saturating_sub(train.len());
    let train = if deficit > 0 {
        info!(
            have = train.len(),
            want = config.min_training_rows,
            "training split below minimum size, adding synthetic rows"
        );
        augment_data(&train, deficit, config.seed)
    } else {
        train
    };
    let synthetic_rows = train.iter().filter(|r| r.synthetic).count();

    let (x, y) = matrix(&train);
    if let Err(err) = model.train(&x, &y) {
        let err = anyhow::Error::new(err).context("fitting classifier");
        error!("training failed, returning fallback model: {err:#}");
        let mut fallback = TrainedModel::new(config.kind, model.predictors.clone(), config.model);
        fallback.version = FALLBACK_VERSION.to_string();
        return Outcome::degraded(
            TrainingReport {
                model: fallback,
                train_rows: train.len(),
                synthetic_rows,
                test_rows: test.len(),
                dropped_rows: dropped,
                metrics: None,
            },
            format!("{err:#}"),
        );
    }

    let metrics = if test.len() > config.min_eval_rows {
        let (tx, ty) = matrix(&test);
        match model.evaluate(&tx, &ty) {
            Ok(m) => Some(m),
            Err(err) => {
                warn!("evaluation skipped: {err}");
                None
            }
        }
    } else {
        info!(test_rows = test.len(), "held-out split too small, evaluation skipped");
        None
    };

    Outcome::Ready(TrainingReport {
        model,
        train_rows: train.len(),
        synthetic_rows,
        test_rows: test.len(),
        dropped_rows: dropped,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::forest::ForestParams;
    use crate::match_record::fixtures::{date, record};
    use crate::match_record::{MatchRecord, StatColumn, Venue};

    fn fast_config() -> TrainerConfig {
        TrainerConfig {
            model: ModelConfig {
                forest: ForestParams {
                    n_estimators: 10,
                    seed: 42,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn season(n: u32) -> MatchTable {
        let teams = ["A", "B", "C", "D"];
        let mut records: Vec<MatchRecord> = Vec::new();
        for i in 0..n {
            let team = teams[(i % 4) as usize];
            let opp = teams[((i + 1) % 4) as usize];
            let day = date(2023, 1, 1) + chrono::Days::new(u64::from(i / 4) * 7);
            let gf = f64::from((i * 7) % 4);
            let ga = f64::from((i * 3) % 3);
            let venue = if i % 2 == 0 { Venue::Home } else { Venue::Away };
            records.push(record(day, team, opp, venue, gf, ga));
        }
        let stats: BTreeSet<StatColumn> = StatColumn::CORE.into_iter().collect();
        MatchTable::new(records, stats)
    }

    #[test]
    fn empty_table_degrades_to_untrained_default() {
        let out = train_from_table(&MatchTable::default(), &fast_config());
        assert!(out.is_degraded());
        let report = out.into_inner();
        assert!(!report.model.is_trained());
        assert_eq!(report.model.version, UNTRAINED_VERSION);
        assert_eq!(report.model.predict_proba(&[vec![0.0; 4]]), vec![[0.5, 0.5]]);
    }

    #[test]
    fn small_table_is_topped_up_in_training_split_only() {
        let out = train_from_table(&season(40), &fast_config());
        assert!(!out.is_degraded());
        let report = out.into_inner();
        assert_eq!(report.test_rows, 8);
        assert_eq!(report.train_rows, 100);
        assert_eq!(report.synthetic_rows, 100 - 32);
        assert!(report.model.is_trained());
        assert!(report.metrics.is_none());
    }

    #[test]
    fn large_table_is_evaluated() {
        let out = train_from_table(&season(200), &fast_config());
        let report = out.into_inner();
        assert_eq!(report.synthetic_rows, 0);
        assert_eq!(report.test_rows, 40);
        assert!(report.metrics.is_some());
        assert_eq!(report.model.state_label(), "evaluated");
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let table = season(30);
        let frame = prepare_model_data(&table, &[3]);
        let set = assemble_training_data(&frame, FeatureSet::Basic);
        let (a_train, a_test) = split_rows(set.rows.clone(), 0.2, 7);
        let (b_train, b_test) = split_rows(set.rows, 0.2, 7);
        assert_eq!(a_test, b_test);
        assert_eq!(a_train, b_train);
        assert_eq!(a_test.len(), 6);
        assert_eq!(a_train.len(), 24);
    }

    #[test]
    fn malformed_set_falls_back() {
        let set = TrainingSet {
            predictors: vec!["venue_code".to_string()],
            rows: (0..20)
                .map(|i| TrainingRow {
                    record: record(date(2023, 1, 1), "A", "B", Venue::Home, 1.0, 0.0),
                    features: if i % 2 == 0 { vec![1.0, 2.0] } else { vec![1.0] },
                    target: 1,
                    synthetic: false,
                })
                .collect(),
            dropped: 0,
        };
        let config = TrainerConfig {
            min_training_rows: 0,
            ..fast_config()
        };
        let out = train_from_set(set, &config);
        assert!(out.is_degraded());
        assert!(out.reason().unwrap().contains("features"));
        assert_eq!(out.value().model.version, FALLBACK_VERSION);
    }
}
