use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::form::DEFAULT_WINDOWS;
use crate::integrate::RefreshSources;
use crate::model::{EnsembleWeights, ModelConfig, ModelKind};
use crate::model_data::FeatureSet;
use crate::trainer::TrainerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub model_dir: PathBuf,
    pub matches_csv: PathBuf,
    pub odds_csv: PathBuf,
    pub weather_csv: PathBuf,
    pub team_aliases_path: Option<PathBuf>,
    pub form_windows: Vec<usize>,
    pub min_training_rows: usize,
    pub train_seed: u64,
    pub model_kind: ModelKind,
    pub ensemble_weights: EnsembleWeights,
    pub feature_set: FeatureSet,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Load `.env.local` and `.env` if present, then read the process
    /// environment. Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(opt_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            lookup(key).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default))
        };

        let form_windows = lookup("FORM_WINDOWS")
            .map(|raw| parse_list::<usize>(&raw))
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| DEFAULT_WINDOWS.to_vec());
        let ensemble_weights = lookup("ENSEMBLE_WEIGHTS")
            .map(|raw| parse_list::<f64>(&raw))
            .and_then(|w| match w.as_slice() {
                [forest, boosted] => Some(EnsembleWeights {
                    forest: *forest,
                    boosted: *boosted,
                }),
                _ => None,
            })
            .unwrap_or_default();

        Self {
            database_path: path("DATABASE_PATH", "data/matchday.sqlite"),
            model_dir: path("MODEL_DIR", "models"),
            matches_csv: path("MATCHES_CSV", "data/matches.csv"),
            odds_csv: path("ODDS_CSV", "data/processed/latest_odds.csv"),
            weather_csv: path("WEATHER_CSV", "data/processed/match_weather.csv"),
            team_aliases_path: lookup("TEAM_ALIASES_PATH").map(PathBuf::from),
            form_windows,
            min_training_rows: parsed(&lookup, "MIN_TRAINING_ROWS").unwrap_or(100),
            train_seed: parsed(&lookup, "TRAIN_SEED").unwrap_or(42),
            model_kind: parsed(&lookup, "MODEL_KIND").unwrap_or(ModelKind::RandomForest),
            ensemble_weights,
            feature_set: parsed(&lookup, "FEATURE_SET").unwrap_or(FeatureSet::Basic),
        }
    }

    pub fn refresh_sources(&self) -> RefreshSources {
        RefreshSources {
            matches: self.matches_csv.clone(),
            odds: Some(self.odds_csv.clone()),
            weather: Some(self.weather_csv.clone()),
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        let mut model = ModelConfig {
            weights: self.ensemble_weights,
            ..ModelConfig::default()
        };
        model.forest.seed = self.train_seed;
        TrainerConfig {
            kind: self.model_kind,
            model,
            feature_set: self.feature_set,
            windows: self.form_windows.clone(),
            min_training_rows: self.min_training_rows,
            seed: self.train_seed,
            ..TrainerConfig::default()
        }
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let value = raw.trim().parse().ok();
    if value.is_none() {
        warn!(key, raw = %raw, "ignoring unparseable setting");
    }
    value
}

fn parse_list<T: std::str::FromStr>(raw: &str) -> Vec<T> {
    raw.split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<T>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[]);
        assert_eq!(s.database_path, PathBuf::from("data/matchday.sqlite"));
        assert_eq!(s.model_dir, PathBuf::from("models"));
        assert_eq!(s.form_windows, vec![3, 5, 10]);
        assert_eq!(s.min_training_rows, 100);
        assert_eq!(s.train_seed, 42);
        assert_eq!(s.model_kind, ModelKind::RandomForest);
        assert_eq!(s.feature_set, FeatureSet::Basic);
        assert_eq!(s.ensemble_weights, EnsembleWeights::default());
        assert!(s.team_aliases_path.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("FORM_WINDOWS", "5, 2"),
            ("MODEL_KIND", "ensemble"),
            ("ENSEMBLE_WEIGHTS", "0.7,0.6"),
            ("FEATURE_SET", "form"),
            ("TRAIN_SEED", "7"),
        ]);
        assert_eq!(s.form_windows, vec![5, 2]);
        assert_eq!(s.model_kind, ModelKind::Ensemble);
        assert_eq!(s.ensemble_weights.forest, 0.7);
        assert_eq!(s.ensemble_weights.boosted, 0.6);
        assert_eq!(s.feature_set, FeatureSet::Form);

        let trainer = s.trainer_config();
        assert_eq!(trainer.seed, 7);
        assert_eq!(trainer.model.forest.seed, 7);
        assert_eq!(trainer.kind, ModelKind::Ensemble);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let s = settings(&[
            ("MIN_TRAINING_ROWS", "lots"),
            ("ENSEMBLE_WEIGHTS", "0.5"),
            ("FORM_WINDOWS", "x,y"),
        ]);
        assert_eq!(s.min_training_rows, 100);
        assert_eq!(s.ensemble_weights, EnsembleWeights::default());
        assert_eq!(s.form_windows, vec![3, 5, 10]);
    }
}
