use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use matchday_form::config::Settings;
use matchday_form::export::export_features;
use matchday_form::feature_generator::FeatureGenerator;
use matchday_form::model::ModelKind;
use matchday_form::model_data::FeatureSet;
use matchday_form::pipeline::{load_aliases, load_match_table, refresh_pipeline, train_model};
use matchday_form::predict::{PredictionRequest, predict_match};
use matchday_form::registry::{ModelSelector, ModelVersionRegistry};
use matchday_form::sample_data::SampleSeason;

#[derive(Debug, Parser)]
#[command(name = "matchday", about = "Leak-free match form features and win models")]
struct Args {
    /// sqlite file for integrated matches and model versions
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// directory for model artifacts
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract, integrate and load match, odds and weather files
    Refresh {
        #[arg(long)]
        matches: Option<PathBuf>,
        #[arg(long)]
        odds: Option<PathBuf>,
        #[arg(long)]
        weather: Option<PathBuf>,
    },
    /// Train on the integrated table and register a new version
    Train {
        #[arg(long)]
        kind: Option<ModelKind>,
        #[arg(long)]
        feature_set: Option<FeatureSet>,
    },
    /// Predict one match from a JSON request file
    Predict {
        request: PathBuf,
        /// version name; defaults to the latest of the configured kind
        #[arg(long)]
        version: Option<String>,
    },
    /// List registered versions, or show one in full
    Versions {
        #[arg(long)]
        model_type: Option<String>,
        #[arg(long)]
        details: Option<String>,
    },
    /// Write generated feature rows (and a model's importances) to xlsx
    Export {
        out: PathBuf,
        #[arg(long)]
        version: Option<String>,
    },
    /// Write a synthetic season as matches/odds/weather csv files
    Sample {
        dir: PathBuf,
        #[arg(long, default_value_t = 20)]
        teams: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    debug!("args: {args:?}");
    let mut settings = Settings::from_env();
    if let Some(db) = args.db {
        settings.database_path = db;
    }
    if let Some(dir) = args.model_dir {
        settings.model_dir = dir;
    }

    match args.command {
        Command::Refresh {
            matches,
            odds,
            weather,
        } => {
            if let Some(path) = matches {
                settings.matches_csv = path;
            }
            if let Some(path) = odds {
                settings.odds_csv = path;
            }
            if let Some(path) = weather {
                settings.weather_csv = path;
            }
            println!("{}", refresh_pipeline(&settings));
        }
        Command::Train { kind, feature_set } => {
            if let Some(kind) = kind {
                settings.model_kind = kind;
            }
            if let Some(set) = feature_set {
                settings.feature_set = set;
            }
            println!("{}", train_model(&settings));
        }
        Command::Predict { request, version } => {
            let raw = fs::read_to_string(&request)
                .with_context(|| format!("read request {}", request.display()))?;
            let request: PredictionRequest =
                serde_json::from_str(&raw).context("parse prediction request")?;
            let registry = ModelVersionRegistry::new(&settings.database_path, &settings.model_dir)?;
            let selector = match version {
                Some(name) => ModelSelector::Named(name),
                None => ModelSelector::LatestOf(settings.model_kind.tag().to_string()),
            };
            let model = registry
                .load_model(&selector)?
                .ok_or_else(|| anyhow!("no model found for {selector:?}"))?;
            let today = Local::now().date_naive();
            let history = load_match_table(&settings, today)?;
            let response = predict_match(
                &model,
                &request,
                &history.records,
                &load_aliases(&settings)?,
                &settings.form_windows,
                today,
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Versions {
            model_type,
            details,
        } => {
            let registry = ModelVersionRegistry::new(&settings.database_path, &settings.model_dir)?;
            if let Some(name) = details {
                let entry = registry
                    .get_version_details(&name)?
                    .ok_or_else(|| anyhow!("unknown version {name}"))?;
                println!("{} ({})", entry.version_name, entry.model_type);
                println!("created: {}", entry.creation_date.to_rfc3339());
                if let Some(desc) = &entry.description {
                    println!("description: {desc}");
                }
                if let Some(hp) = &entry.hyperparameters {
                    println!("hyperparameters: {}", serde_json::to_string(hp)?);
                }
                if let Some(metrics) = &entry.metrics {
                    for (key, value) in metrics {
                        println!("  {key}: {value:.4}");
                    }
                }
                if let Some(importance) = &entry.feature_importance {
                    for item in importance.iter().take(10) {
                        println!("  {:<28} {:.4}", item.feature, item.importance);
                    }
                }
            } else {
                let entries = registry.get_model_versions(model_type.as_deref())?;
                if entries.is_empty() {
                    println!("no registered versions");
                }
                for entry in entries {
                    println!(
                        "{:<40} {:<14} {}",
                        entry.version_name,
                        entry.model_type,
                        entry.creation_date.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Command::Export { out, version } => {
            let today = Local::now().date_naive();
            let table = load_match_table(&settings, today)?;
            let rows = FeatureGenerator::new(&settings.form_windows).generate(&table.records);
            let model = match version {
                Some(name) => {
                    let registry =
                        ModelVersionRegistry::new(&settings.database_path, &settings.model_dir)?;
                    Some(
                        registry
                            .load_model(&ModelSelector::Named(name.clone()))?
                            .ok_or_else(|| anyhow!("no artifact for version {name}"))?,
                    )
                }
                None => None,
            };
            let report = export_features(&out, &rows, model.as_ref())?;
            println!(
                "Exported {} feature rows x {} columns to {}",
                report.feature_rows,
                report.feature_columns,
                out.display()
            );
        }
        Command::Sample { dir, teams, seed } => {
            let season = SampleSeason::generate(teams, seed);
            season.write_all(&dir)?;
            println!(
                "Wrote {} match rows, {} odds rows, {} weather rows to {}",
                season.records.len(),
                season.odds.len(),
                season.weather.len(),
                dir.display()
            );
        }
    }
    Ok(())
}
