use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::model::TrainedModel;

const ENTRY_COLUMNS: &str = "id, version_name, model_type, creation_date, description, \
     hyperparameters, feature_importance, metrics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// One immutable row of the `model_versions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVersionEntry {
    pub id: i64,
    pub version_name: String,
    pub model_type: String,
    pub creation_date: DateTime<Utc>,
    pub description: Option<String>,
    pub hyperparameters: Option<BTreeMap<String, Value>>,
    pub feature_importance: Option<Vec<FeatureImportance>>,
    pub metrics: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub version_name: Option<String>,
    pub model_type: Option<String>,
    pub description: Option<String>,
    pub hyperparameters: Option<BTreeMap<String, Value>>,
    pub metrics: Option<BTreeMap<String, f64>>,
}

impl RegisterRequest {
    /// Hyperparameters and any evaluation metrics taken from the model itself.
    pub fn from_model(model: &TrainedModel) -> Self {
        Self {
            hyperparameters: Some(model.hyperparameters()),
            metrics: model.metrics().map(|m| m.to_map()),
            ..Default::default()
        }
    }

    pub fn named(mut self, version_name: impl Into<String>) -> Self {
        self.version_name = Some(version_name.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A model that has been persisted. Read-only from here on.
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    entry: ModelVersionEntry,
    model: TrainedModel,
}

impl RegisteredModel {
    pub fn entry(&self) -> &ModelVersionEntry {
        &self.entry
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn version_name(&self) -> &str {
        &self.entry.version_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelector {
    Named(String),
    LatestOf(String),
}

/// Write-once model versions: metadata in SQLite, one JSON artifact per version.
///
/// Every call opens its own connection and drops it before returning. Only one
/// writer per database is assumed; auto-generated names have one-second
/// resolution and two registrations of the same type within that second collide.
#[derive(Debug, Clone)]
pub struct ModelVersionRegistry {
    db_path: PathBuf,
    model_dir: PathBuf,
}

pub fn init_schema(conn: &Connection) -> Result<(), RegistryError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS model_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_name TEXT NOT NULL UNIQUE,
            model_type TEXT NOT NULL,
            creation_date TEXT NOT NULL,
            description TEXT NULL,
            hyperparameters TEXT NULL,
            feature_importance TEXT NULL,
            metrics TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_model_versions_type ON model_versions(model_type);
        "#,
    )?;
    Ok(())
}

fn validate_version_name(name: &str) -> Result<(), RegistryError> {
    let ok = !name.trim().is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidVersionName(name.to_string()))
    }
}

pub fn auto_version_name(model_type: &str, at: DateTime<Local>) -> String {
    format!("{model_type}_{}", at.format("%Y%m%d_%H%M%S"))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

struct RawEntry {
    id: i64,
    version_name: String,
    model_type: String,
    creation_date: String,
    description: Option<String>,
    hyperparameters: Option<String>,
    feature_importance: Option<String>,
    metrics: Option<String>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version_name: row.get(1)?,
            model_type: row.get(2)?,
            creation_date: row.get(3)?,
            description: row.get(4)?,
            hyperparameters: row.get(5)?,
            feature_importance: row.get(6)?,
            metrics: row.get(7)?,
        })
    }

    fn decode(self) -> Result<ModelVersionEntry, RegistryError> {
        let creation_date = DateTime::parse_from_rfc3339(&self.creation_date)
            .map_err(|_| RegistryError::BadTimestamp(self.creation_date.clone()))?
            .with_timezone(&Utc);
        Ok(ModelVersionEntry {
            id: self.id,
            version_name: self.version_name,
            model_type: self.model_type,
            creation_date,
            description: self.description,
            hyperparameters: decode_blob(self.hyperparameters.as_deref())?,
            feature_importance: decode_blob(self.feature_importance.as_deref())?,
            metrics: decode_blob(self.metrics.as_deref())?,
        })
    }
}

fn decode_blob<T: serde::de::DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, RegistryError> {
    raw.map(serde_json::from_str).transpose().map_err(Into::into)
}

fn encode_blob<T: Serialize>(value: Option<&T>) -> Result<Option<String>, RegistryError> {
    value.map(serde_json::to_string).transpose().map_err(Into::into)
}

impl ModelVersionRegistry {
    pub fn new(db_path: impl Into<PathBuf>, model_dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry = Self {
            db_path: db_path.into(),
            model_dir: model_dir.into(),
        };
        fs::create_dir_all(&registry.model_dir)?;
        registry.open()?;
        Ok(registry)
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn artifact_path(&self, version_name: &str) -> PathBuf {
        self.model_dir.join(format!("{version_name}.json"))
    }

    fn open(&self) -> Result<Connection, RegistryError> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        init_schema(&conn)?;
        Ok(conn)
    }

    fn write_artifact(&self, model: &TrainedModel) -> Result<PathBuf, RegistryError> {
        fs::create_dir_all(&self.model_dir)?;
        let path = self.artifact_path(&model.version);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(model)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Persist `model` under a new, unique version name.
    ///
    /// A name already in the table is rejected before the artifact is written.
    /// If the metadata insert itself fails the transaction rolls back and the
    /// artifact written just before it stays on disk.
    pub fn register_model(
        &self,
        mut model: TrainedModel,
        request: RegisterRequest,
    ) -> Result<RegisteredModel, RegistryError> {
        let model_type = request
            .model_type
            .clone()
            .unwrap_or_else(|| model.kind.tag().to_string());
        let version_name = request
            .version_name
            .clone()
            .unwrap_or_else(|| auto_version_name(&model_type, Local::now()));
        validate_version_name(&version_name)?;

        let mut conn = self.open()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM model_versions WHERE version_name = ?1",
                params![version_name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            warn!(version = %version_name, "refusing to re-register existing model version");
            return Err(RegistryError::DuplicateVersion(version_name));
        }

        model.version = version_name.clone();
        let path = self.write_artifact(&model)?;

        let importance: Option<Vec<FeatureImportance>> = model.is_trained().then(|| {
            model
                .get_feature_importance()
                .into_iter()
                .map(|(feature, importance)| FeatureImportance {
                    feature,
                    importance,
                })
                .collect()
        });
        let metrics = request.metrics.as_ref().map(|m| {
            m.iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(k, v)| (k.clone(), *v))
                .collect::<BTreeMap<String, f64>>()
        });
        let creation_date = Utc::now().trunc_subsecs(6);

        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO model_versions (version_name, model_type, creation_date, description, \
             hyperparameters, feature_importance, metrics) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                version_name,
                model_type,
                creation_date.to_rfc3339_opts(SecondsFormat::Micros, true),
                request.description,
                encode_blob(request.hyperparameters.as_ref())?,
                encode_blob(importance.as_ref())?,
                encode_blob(metrics.as_ref())?,
            ],
        );
        if let Err(err) = inserted {
            drop(tx);
            warn!(
                version = %version_name,
                artifact = %path.display(),
                "metadata insert failed and was rolled back; artifact left on disk"
            );
            if is_unique_violation(&err) {
                return Err(RegistryError::DuplicateVersion(version_name));
            }
            return Err(err.into());
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(version = %version_name, model_type = %model_type, id, "registered model version");
        let entry = ModelVersionEntry {
            id,
            version_name,
            model_type,
            creation_date,
            description: request.description,
            hyperparameters: request.hyperparameters,
            feature_importance: importance,
            metrics,
        };
        Ok(RegisteredModel { entry, model })
    }

    /// Newest first, optionally restricted to one model type.
    pub fn get_model_versions(
        &self,
        model_type: Option<&str>,
    ) -> Result<Vec<ModelVersionEntry>, RegistryError> {
        let conn = self.open()?;
        let raw: Vec<RawEntry> = match model_type {
            Some(kind) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM model_versions WHERE model_type = ?1 \
                     ORDER BY creation_date DESC, id DESC"
                ))?;
                let rows = stmt
                    .query_map(params![kind], RawEntry::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM model_versions ORDER BY creation_date DESC, id DESC"
                ))?;
                let rows = stmt
                    .query_map([], RawEntry::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        raw.into_iter().map(RawEntry::decode).collect()
    }

    pub fn get_latest_version(
        &self,
        model_type: &str,
    ) -> Result<Option<ModelVersionEntry>, RegistryError> {
        Ok(self.get_model_versions(Some(model_type))?.into_iter().next())
    }

    pub fn get_version_details(
        &self,
        version_name: &str,
    ) -> Result<Option<ModelVersionEntry>, RegistryError> {
        let conn = self.open()?;
        let raw = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM model_versions WHERE version_name = ?1"),
                params![version_name],
                RawEntry::from_row,
            )
            .optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    /// `Ok(None)` when no version matches or its artifact file is gone.
    pub fn load_model(&self, selector: &ModelSelector) -> Result<Option<TrainedModel>, RegistryError> {
        let version_name = match selector {
            ModelSelector::Named(name) => name.clone(),
            ModelSelector::LatestOf(kind) => match self.get_latest_version(kind)? {
                Some(entry) => entry.version_name,
                None => {
                    debug!(model_type = %kind, "no registered version");
                    return Ok(None);
                }
            },
        };
        validate_version_name(&version_name)?;
        let path = self.artifact_path(&version_name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(artifact = %path.display(), "model artifact not found");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let model: TrainedModel = serde_json::from_str(&raw)?;
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{ModelConfig, ModelKind};

    fn registry(dir: &Path) -> ModelVersionRegistry {
        ModelVersionRegistry::new(dir.join("meta.sqlite"), dir.join("models")).unwrap()
    }

    fn untrained(kind: ModelKind) -> TrainedModel {
        TrainedModel::new(kind, vec!["venue_code".to_string()], ModelConfig::default())
    }

    #[test]
    fn auto_name_uses_type_and_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(auto_version_name("ensemble", at), "ensemble_20240309_140507");
    }

    #[test]
    fn register_then_list_and_details() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let first = reg
            .register_model(
                untrained(ModelKind::RandomForest),
                RegisterRequest::default().named("rf_a").described("first"),
            )
            .unwrap();
        assert_eq!(first.model().version, "rf_a");
        assert!(reg.artifact_path("rf_a").exists());
        assert!(first.entry().feature_importance.is_none());

        reg.register_model(
            untrained(ModelKind::RandomForest),
            RegisterRequest::default().named("rf_b"),
        )
        .unwrap();
        reg.register_model(
            untrained(ModelKind::Ensemble),
            RegisterRequest::default().named("ens_a"),
        )
        .unwrap();

        let rf: Vec<String> = reg
            .get_model_versions(Some("randomforest"))
            .unwrap()
            .into_iter()
            .map(|e| e.version_name)
            .collect();
        assert_eq!(rf, vec!["rf_b", "rf_a"]);
        assert_eq!(reg.get_model_versions(None).unwrap().len(), 3);
        assert_eq!(
            reg.get_latest_version("ensemble").unwrap().unwrap().version_name,
            "ens_a"
        );
        assert!(reg.get_latest_version("xgboost").unwrap().is_none());

        let details = reg.get_version_details("rf_a").unwrap().unwrap();
        assert_eq!(details.description.as_deref(), Some("first"));
        assert!(reg.get_version_details("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_name_keeps_first_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.register_model(
            untrained(ModelKind::RandomForest),
            RegisterRequest::default().named("v1"),
        )
        .unwrap();
        let before = std::fs::read_to_string(reg.artifact_path("v1")).unwrap();

        let err = reg
            .register_model(
                untrained(ModelKind::Ensemble),
                RegisterRequest::default().named("v1"),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateVersion(ref n) if n == "v1"));
        assert_eq!(std::fs::read_to_string(reg.artifact_path("v1")).unwrap(), before);
        assert_eq!(reg.get_model_versions(None).unwrap().len(), 1);
    }

    #[test]
    fn load_missing_artifact_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(reg.load_model(&ModelSelector::Named("nope".into())).unwrap().is_none());
        assert!(reg.load_model(&ModelSelector::LatestOf("ensemble".into())).unwrap().is_none());

        reg.register_model(
            untrained(ModelKind::Ensemble),
            RegisterRequest::default().named("gone"),
        )
        .unwrap();
        std::fs::remove_file(reg.artifact_path("gone")).unwrap();
        assert!(reg.load_model(&ModelSelector::LatestOf("ensemble".into())).unwrap().is_none());
    }

    #[test]
    fn corrupt_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        std::fs::write(reg.artifact_path("bad"), "{not json").unwrap();
        assert!(matches!(
            reg.load_model(&ModelSelector::Named("bad".into())),
            Err(RegistryError::Serialize(_))
        ));
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let err = reg
            .register_model(
                untrained(ModelKind::Ensemble),
                RegisterRequest::default().named("../escape"),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidVersionName(_)));
    }
}
