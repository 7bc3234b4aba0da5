//! Coarse entry points for an external scheduler.
//!
//! Each call opens its own resources, is safe to retry, and reports its
//! outcome as a one-line string. Failures are logged and returned, never
//! raised.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::ingest::read_matches_csv;
use crate::integrate::{full_data_refresh, open_db, read_integrated};
use crate::match_record::MatchTable;
use crate::registry::{ModelVersionRegistry, RegisterRequest};
use crate::team_names::TeamAliases;
use crate::trainer::train_from_table;

pub fn load_aliases(settings: &Settings) -> Result<TeamAliases> {
    match settings.team_aliases_path.as_deref() {
        Some(path) => TeamAliases::load(path),
        None => Ok(TeamAliases::builtin()),
    }
}

/// The integrated table if a refresh has populated it, otherwise the raw
/// match file.
pub fn load_match_table(settings: &Settings, today: NaiveDate) -> Result<MatchTable> {
    let conn = open_db(&settings.database_path)?;
    let table = read_integrated(&conn)?;
    if !table.is_empty() {
        info!(rows = table.len(), "using integrated matches");
        return Ok(table);
    }
    warn!(
        path = %settings.matches_csv.display(),
        "integrated table empty, reading raw match file"
    );
    let aliases = load_aliases(settings)?;
    let ingested = read_matches_csv(&settings.matches_csv, &aliases, today)
        .with_context(|| format!("read matches from {}", settings.matches_csv.display()))?;
    Ok(ingested.table)
}

fn run_refresh(settings: &Settings, today: NaiveDate) -> Result<String> {
    let aliases = load_aliases(settings)?;
    let mut conn = open_db(&settings.database_path)?;
    Ok(
        match full_data_refresh(&mut conn, &settings.refresh_sources(), &aliases, today)? {
            Some(summary) => format!(
                "Data refresh completed: {} matches ({} with odds, {} with weather, {} warnings)",
                summary.matches, summary.with_odds, summary.with_weather, summary.warnings
            ),
            None => "Data refresh skipped: no match data available".to_string(),
        },
    )
}

pub fn refresh_pipeline(settings: &Settings) -> String {
    refresh_pipeline_on(settings, Local::now().date_naive())
}

pub fn refresh_pipeline_on(settings: &Settings, today: NaiveDate) -> String {
    match run_refresh(settings, today) {
        Ok(message) => {
            info!("{message}");
            message
        }
        Err(err) => {
            error!("data refresh failed: {err:#}");
            format!("Data refresh failed: {err:#}")
        }
    }
}

fn run_training(settings: &Settings, today: NaiveDate) -> Result<String> {
    let table = load_match_table(settings, today)?;
    let config = settings.trainer_config();
    let outcome = train_from_table(&table, &config);
    let degraded = outcome.reason().map(str::to_string);
    let report = outcome.into_inner();

    if !report.model.is_trained() {
        return Ok(format!(
            "Training produced no usable model ({}), nothing registered",
            degraded.as_deref().unwrap_or("untrained")
        ));
    }

    let accuracy = report.metrics.as_ref().map(|m| m.overall.accuracy);
    let registry = ModelVersionRegistry::new(&settings.database_path, &settings.model_dir)?;
    let request = RegisterRequest::from_model(&report.model).described(format!(
        "{} rows ({} synthetic), feature set {}",
        report.train_rows, report.synthetic_rows, config.feature_set
    ));
    let registered = registry
        .register_model(report.model, request)
        .context("register trained model")?;

    Ok(match accuracy {
        Some(acc) => format!(
            "Model trained and registered as {} (accuracy {acc:.3})",
            registered.version_name()
        ),
        None => format!(
            "Model trained and registered as {} (not evaluated)",
            registered.version_name()
        ),
    })
}

pub fn train_model(settings: &Settings) -> String {
    train_model_on(settings, Local::now().date_naive())
}

pub fn train_model_on(settings: &Settings, today: NaiveDate) -> String {
    match run_training(settings, today) {
        Ok(message) => {
            info!("{message}");
            message
        }
        Err(err) => {
            error!("model training failed: {err:#}");
            format!("Model training failed: {err:#}")
        }
    }
}
