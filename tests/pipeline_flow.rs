use chrono::NaiveDate;

use matchday_form::config::Settings;
use matchday_form::error::IngestError;
use matchday_form::feature_generator::FeatureGenerator;
use matchday_form::ingest::read_matches;
use matchday_form::integrate::{RefreshSources, full_data_refresh, open_db, read_integrated};
use matchday_form::model::ModelKind;
use matchday_form::model_data::FeatureSet;
use matchday_form::predict::{PredictionRequest, Side, predict_match};
use matchday_form::registry::{ModelSelector, ModelVersionRegistry, RegisterRequest};
use matchday_form::sample_data::SampleSeason;
use matchday_form::team_names::TeamAliases;
use matchday_form::trainer::{TrainerConfig, train_from_table};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

#[test]
fn schema_error_names_every_missing_column() {
    let err = read_matches(
        "team,opponent\nA,B\n".as_bytes(),
        &TeamAliases::builtin(),
        today(),
    )
    .unwrap_err();
    match err {
        IngestError::Schema { missing } => {
            assert_eq!(missing, vec!["date", "venue", "result"]);
        }
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
fn refresh_train_register_predict() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    SampleSeason::generate(8, 17).write_all(&raw).unwrap();

    let mut conn = open_db(&dir.path().join("matchday.sqlite")).unwrap();
    let sources = RefreshSources {
        matches: raw.join("matches.csv"),
        odds: Some(raw.join("odds.csv")),
        weather: Some(raw.join("weather.csv")),
    };
    let summary = full_data_refresh(&mut conn, &sources, &TeamAliases::builtin(), today())
        .unwrap()
        .unwrap();
    // 8 teams, 14 rounds, 4 fixtures, 2 rows
    assert_eq!(summary.matches, 224);
    assert_eq!(summary.with_odds, 224);
    assert_eq!(summary.with_weather, 224);

    let table = read_integrated(&conn).unwrap();
    let rows = FeatureGenerator::default().generate(&table.records);
    assert_eq!(rows.len(), 224);
    assert!(rows.iter().all(|r| r.odds.is_some()));

    let mut config = TrainerConfig {
        kind: ModelKind::Ensemble,
        feature_set: FeatureSet::Form,
        ..Settings::default().trainer_config()
    };
    config.model.forest.n_estimators = 30;
    config.model.boosting.n_estimators = 30;
    let report = train_from_table(&table, &config).into_inner();
    assert!(report.model.is_trained());
    assert_eq!(report.synthetic_rows, 0);
    assert!(report.metrics.is_some());
    assert!(report.model.predictors.iter().any(|p| p == "points_last_5"));

    let registry =
        ModelVersionRegistry::new(dir.path().join("matchday.sqlite"), dir.path().join("models")).unwrap();
    let request = RegisterRequest::from_model(&report.model).described("flow test");
    let registered = registry.register_model(report.model, request).unwrap();
    let entry = registry
        .get_version_details(registered.version_name())
        .unwrap()
        .unwrap();
    assert_eq!(entry.model_type, "ensemble");
    assert_eq!(entry.description.as_deref(), Some("flow test"));
    assert!(entry.feature_importance.is_some());

    let model = registry
        .load_model(&ModelSelector::LatestOf("ensemble".to_string()))
        .unwrap()
        .unwrap();
    let request = PredictionRequest {
        home_team: "Arsenal".to_string(),
        away_team: "Aston Villa".to_string(),
        match_date: "2024-05-01".to_string(),
        match_time: Some("15:00".to_string()),
        team_to_predict: Side::Home,
        goals_for: 1.6,
        goals_against: 1.1,
        shots: 13.0,
        shots_on_target: 5.0,
        distance: None,
        free_kicks: None,
        penalties: None,
        penalty_attempts: None,
    };
    let response = predict_match(
        &model,
        &request,
        &table.records,
        &TeamAliases::builtin(),
        &[3, 5, 10],
        today(),
    );
    assert_eq!(response.team, "Arsenal");
    assert!((0.0..=1.0).contains(&response.win_probability));
    assert_eq!(response.key_factors.len(), 5);
    let expected = if response.win_probability > 0.5 { "WIN" } else { "NOT WIN" };
    assert_eq!(response.prediction, expected);
}
