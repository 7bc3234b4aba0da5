use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use matchday_form::augment::augment_data;
use matchday_form::feature_generator::FeatureGenerator;
use matchday_form::ingest::read_matches;
use matchday_form::market_odds::ImpliedProbabilities;
use matchday_form::match_record::{MarketOdds, MatchRecord, MatchResult, MatchTable, StatColumn};
use matchday_form::model::{ModelConfig, ModelKind, TrainedModel};
use matchday_form::model_data::{FeatureSet, assemble_training_data, prepare_model_data};
use matchday_form::registry::{ModelSelector, ModelVersionRegistry, RegisterRequest};
use matchday_form::sample_data::SampleSeason;
use matchday_form::team_names::TeamAliases;

type RowKey = (String, NaiveDate, String);

fn key(r: &MatchRecord) -> RowKey {
    (r.team.clone(), r.date, r.opponent.clone())
}

fn season_table(teams: usize, seed: u64) -> MatchTable {
    let season = SampleSeason::generate(teams, seed);
    MatchTable::new(season.records, StatColumn::ALL.into_iter().collect())
}

fn form_snapshot(records: &[MatchRecord], cutoff: NaiveDate) -> HashMap<RowKey, Vec<(String, f64)>> {
    FeatureGenerator::new(&[3, 5, 10])
        .generate(records)
        .into_iter()
        .filter(|row| row.record.date <= cutoff)
        .map(|row| (key(&row.record), row.form_values()))
        .collect()
}

fn rolling_snapshot(table: &MatchTable, cutoff: NaiveDate) -> HashMap<RowKey, Vec<Option<f64>>> {
    let frame = prepare_model_data(table, &[3, 5]);
    let columns: Vec<usize> = frame
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains("_rolling") || name.contains("_last_") || name.contains("momentum"))
        .map(|(i, _)| i)
        .collect();
    frame
        .rows
        .iter()
        .filter(|row| row.record.date <= cutoff)
        .map(|row| (key(&row.record), columns.iter().map(|&i| row.values[i]).collect()))
        .collect()
}

#[test]
fn later_records_never_change_earlier_features() {
    let table = season_table(8, 21);
    let cutoff = NaiveDate::from_ymd_opt(2023, 10, 14).unwrap();
    let before_form = form_snapshot(&table.records, cutoff);
    let before_rolling = rolling_snapshot(&table, cutoff);
    assert!(!before_form.is_empty());

    // flip every later result and drop a third of the later rows
    let mutated: Vec<MatchRecord> = table
        .records
        .iter()
        .enumerate()
        .filter(|(i, r)| r.date <= cutoff || i % 3 != 0)
        .map(|(_, r)| {
            let mut r = r.clone();
            if r.date > cutoff {
                std::mem::swap(&mut r.stats.goals_for, &mut r.stats.goals_against);
                r.stats.shots += 7.0;
                r.result = MatchResult::from_goals(r.stats.goals_for, r.stats.goals_against);
            }
            r
        })
        .collect();
    let mutated_table = MatchTable::new(mutated, table.stat_columns.clone());

    assert_eq!(form_snapshot(&mutated_table.records, cutoff), before_form);
    assert_eq!(rolling_snapshot(&mutated_table, cutoff), before_rolling);
}

#[test]
fn prepare_model_data_is_idempotent() {
    let table = season_table(6, 3);
    let first = prepare_model_data(&table, &[3, 5, 10]);
    let second = prepare_model_data(&table, &[3, 5, 10]);
    assert_eq!(first, second);
    assert_eq!(
        assemble_training_data(&first, FeatureSet::Form),
        assemble_training_data(&second, FeatureSet::Form)
    );
}

#[test]
fn first_record_has_defaults_not_nan() {
    let table = season_table(4, 8);
    let frame = prepare_model_data(&table, &[3, 5]);
    let mut seen = BTreeSet::new();
    for row in &frame.rows {
        if !seen.insert(row.record.team.clone()) {
            continue;
        }
        for (name, value) in frame.columns.iter().zip(&row.values) {
            let v = value.unwrap_or_else(|| panic!("{name} missing on first record"));
            assert!(v.is_finite(), "{name} = {v}");
            if name.contains("_last_") {
                assert_eq!(v, 0.0, "{name}");
            }
            if let Some(stat) = StatColumn::from_rolling_name(name) {
                assert_eq!(v, stat.prior(), "{name}");
            }
        }
    }
    assert_eq!(seen.len(), 4);
}

#[test]
fn implied_probabilities_sum_to_one() {
    let prices = [1.01, 1.5, 2.0, 3.3, 7.25, 15.0, 101.0];
    for &h in &prices {
        for &d in &prices {
            for &a in &prices {
                let p = ImpliedProbabilities::from_odds(&MarketOdds {
                    home_win: h,
                    draw: d,
                    away_win: a,
                });
                assert!((p.home_win + p.draw + p.away_win - 1.0).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn points_last_3_counts_only_the_prior_win() {
    let csv = "date,team,opponent,venue,result,gf,ga\n\
               2023-01-01,A,B,Home,W,2,1\n\
               2023-01-08,A,C,Away,L,0,2\n";
    let aliases = TeamAliases::empty();
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let table = read_matches(csv.as_bytes(), &aliases, today).unwrap().table;

    let rows = FeatureGenerator::new(&[3]).generate(&table.records);
    let second = rows
        .iter()
        .find(|r| r.record.date == NaiveDate::from_ymd_opt(2023, 1, 8).unwrap())
        .unwrap();
    assert_eq!(second.value("points_last_3"), Some(3.0));

    let frame = prepare_model_data(&table, &[3]);
    let idx = frame.column_index("points_last_3").unwrap();
    assert_eq!(frame.rows[1].values[idx], Some(3.0));
    assert_eq!(frame.rows[0].values[idx], Some(0.0));
}

#[test]
fn augmenting_ten_rows_by_fifty_gives_sixty_consistent_rows() {
    let records: Vec<MatchRecord> = SampleSeason::generate(4, 2).records.into_iter().take(10).collect();
    let out = augment_data(&records, 50, 42);
    assert_eq!(out.len(), 60);
    assert_eq!(&out[..10], &records[..]);
    for r in &out[10..] {
        let expected = if r.stats.goals_for > r.stats.goals_against {
            MatchResult::Win
        } else if r.stats.goals_for < r.stats.goals_against {
            MatchResult::Loss
        } else {
            MatchResult::Draw
        };
        assert_eq!(r.result, expected);
        assert!(r.stats.goals_for >= 0.0 && r.stats.goals_against >= 0.0);
    }
}

fn trained_model() -> (TrainedModel, Vec<Vec<f64>>) {
    let table = season_table(6, 13);
    let frame = prepare_model_data(&table, &[3]);
    let set = assemble_training_data(&frame, FeatureSet::Basic);
    let (x, y) = set.matrix();
    let mut config = ModelConfig::default();
    config.forest.n_estimators = 25;
    config.boosting.n_estimators = 20;
    let mut model = TrainedModel::new(ModelKind::Ensemble, set.predictors.clone(), config);
    model.train(&x, &y).unwrap();
    (model, x)
}

#[test]
fn registered_model_predicts_identically_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let registry =
        ModelVersionRegistry::new(dir.path().join("registry.sqlite"), dir.path().join("models")).unwrap();
    let (model, x) = trained_model();
    let before = model.predict_proba(&x);

    let registered = registry
        .register_model(model, RegisterRequest::default().named("ensemble_roundtrip"))
        .unwrap();
    let loaded = registry
        .load_model(&ModelSelector::Named(registered.version_name().to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(loaded.predict_proba(&x), before);
    assert_eq!(loaded.get_feature_importance(), registered.model().get_feature_importance());
}

#[test]
fn duplicate_version_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry =
        ModelVersionRegistry::new(dir.path().join("registry.sqlite"), dir.path().join("models")).unwrap();
    let (model, _) = trained_model();

    registry
        .register_model(model.clone(), RegisterRequest::default().named("dup"))
        .unwrap();
    let second = registry.register_model(model, RegisterRequest::default().named("dup"));
    assert!(second.is_err());
    let versions = registry.get_model_versions(None).unwrap();
    assert_eq!(versions.iter().filter(|v| v.version_name == "dup").count(), 1);
}
