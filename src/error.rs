use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("no training rows")]
    Empty,

    #[error("feature matrix has {rows} rows but target has {targets}")]
    LengthMismatch { rows: usize, targets: usize },

    #[error("row {row} has {got} features, expected {expected}")]
    RaggedRow {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("non-finite value in row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("target must be 0 or 1, found {0}")]
    BadLabel(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelStateError {
    #[error("model has not been trained")]
    NotTrained,

    #[error("evaluation set is empty")]
    EmptyEvaluationSet,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model version '{0}' is already registered")]
    DuplicateVersion(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("stored creation date '{0}' is not RFC 3339")]
    BadTimestamp(String),

    #[error("invalid model version name '{0}'")]
    InvalidVersionName(String),
}

/// Recoverable anomaly found while normalizing input. Logged, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct DataQualityWarning {
    pub row: usize,
    pub column: &'static str,
    pub message: String,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} [{}]: {}", self.row, self.column, self.message)
    }
}

/// Result of a pipeline stage that prefers handing back a usable value over failing.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Ready(T),
    Degraded { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Outcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Ready(_) => None,
            Outcome::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Ready(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Ready(value) | Outcome::Degraded { value, .. } => value,
        }
    }
}
