use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::encoding::{CategoricalEncoder, default_hour};
use crate::form::RollingFormAggregator;
use crate::match_record::{MatchRecord, MatchTable, StatColumn, team_date_order, team_histories};

pub const BASIC_PREDICTORS: [&str; 4] = ["venue_code", "opp_code", "hour", "day_code"];
pub const ROLLING_WINDOW: usize = 3;

/// Value used for a predictor the frame does not carry.
pub fn predictor_default(name: &str) -> f64 {
    match name {
        "venue_code" => 1.0,
        "opp_code" => 0.0,
        "hour" => default_hour(),
        "day_code" => 0.0,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSet {
    /// Basic codes plus `_rolling` stat means.
    #[default]
    Basic,
    /// Basic plus the windowed form columns.
    Form,
}

impl FromStr for FeatureSet {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(FeatureSet::Basic),
            "form" => Ok(FeatureSet::Form),
            other => Err(format!("unknown feature set '{other}'")),
        }
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeatureSet::Basic => "basic",
            FeatureSet::Form => "form",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRow {
    pub record: MatchRecord,
    pub values: Vec<Option<f64>>,
    pub target: u8,
}

/// Column-named table of encoded model inputs, one row per record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelFrame {
    pub columns: Vec<String>,
    pub form_columns: Vec<String>,
    pub rows: Vec<ModelRow>,
}

impl ModelFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn rolling_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.contains("_rolling"))
            .cloned()
            .collect()
    }

    fn push_column(&mut self, name: String, values: Vec<Option<f64>>) {
        self.columns.push(name);
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.values.push(v);
        }
    }

    /// Adds closed-left `<stat>_rolling` columns for the four core stats.
    pub fn synthesize_default_rolling(&mut self) {
        let records: Vec<MatchRecord> = self.rows.iter().map(|r| r.record.clone()).collect();
        let rolled = closed_left_means(&records, &StatColumn::CORE, ROLLING_WINDOW);
        for (c, column) in StatColumn::CORE.iter().enumerate() {
            let values = rolled.iter().map(|v| Some(v[c])).collect();
            self.push_column(column.rolling_name(), values);
        }
    }
}

/// Per-record means of `columns` over the previous `window` matches on earlier dates.
///
/// A team's first record takes each column's league prior.
pub fn closed_left_means(
    records: &[MatchRecord],
    columns: &[StatColumn],
    window: usize,
) -> Vec<Vec<f64>> {
    let priors: Vec<f64> = columns.iter().map(|c| c.prior()).collect();
    let mut out = vec![priors.clone(); records.len()];
    for history in team_histories(records).values() {
        let mut prefix = vec![vec![0.0; columns.len()]];
        for &idx in history {
            let last = &prefix[prefix.len() - 1];
            let next: Vec<f64> = columns
                .iter()
                .zip(last)
                .map(|(c, acc)| acc + records[idx].stats.get(*c).unwrap_or(c.prior()))
                .collect();
            prefix.push(next);
        }
        let mut day_start = 0;
        for (pos, &idx) in history.iter().enumerate() {
            if pos > 0 && records[history[pos - 1]].date != records[idx].date {
                day_start = pos;
            }
            let start = day_start.saturating_sub(window);
            let n = day_start - start;
            if n == 0 {
                continue;
            }
            out[idx] = (0..columns.len())
                .map(|c| (prefix[day_start][c] - prefix[start][c]) / n as f64)
                .collect();
        }
    }
    out
}

/// Encode the table and attach closed-left rolling and form columns.
///
/// Pure: the same table always yields the same frame, in team then date order.
pub fn prepare_model_data(table: &MatchTable, windows: &[usize]) -> ModelFrame {
    let records = &table.records;
    let encoder = CategoricalEncoder::fit(records);
    let stat_columns: Vec<StatColumn> = table.stat_columns.iter().copied().collect();
    let rolled = closed_left_means(records, &stat_columns, ROLLING_WINDOW);
    let form = RollingFormAggregator::new(windows).compute(records);
    let short = RollingFormAggregator::new(&[3]).compute(records);

    let mut columns: Vec<String> = ["team_code"]
        .into_iter()
        .chain(BASIC_PREDICTORS)
        .map(str::to_string)
        .collect();
    columns.extend(stat_columns.iter().map(|c| c.rolling_name()));
    let mut form_columns = vec!["form_3".to_string()];
    if let Some(first) = form.first() {
        form_columns.extend(first.named_values().into_iter().map(|(k, _)| k));
    }
    columns.extend(form_columns.iter().cloned());

    let rows = team_date_order(records)
        .into_iter()
        .map(|idx| {
            let r = &records[idx];
            let e = encoder.encode(r);
            let form_3 = short[idx].window(3).map(|w| w.mean_points()).unwrap_or(0.0);
            let mut values = vec![e.team_code, e.venue_code, e.opp_code, e.hour, e.day_code];
            values.extend(rolled[idx].iter().copied());
            values.push(form_3);
            values.extend(form[idx].named_values().into_iter().map(|(_, v)| v));
            ModelRow {
                record: r.clone(),
                values: values.into_iter().map(Some).collect(),
                target: e.target,
            }
        })
        .collect();

    debug!(rows = records.len(), columns = columns.len(), "prepared model data");
    ModelFrame {
        columns,
        form_columns,
        rows,
    }
}

/// One training example. `features` follows the predictor order of its set.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub record: MatchRecord,
    pub features: Vec<f64>,
    pub target: u8,
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingSet {
    pub predictors: Vec<String>,
    pub rows: Vec<TrainingRow>,
    pub dropped: usize,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn matrix(&self) -> (Vec<Vec<f64>>, Vec<u8>) {
        let x = self.rows.iter().map(|r| r.features.clone()).collect();
        let y = self.rows.iter().map(|r| r.target).collect();
        (x, y)
    }
}

/// Choose predictors and drop incomplete rows.
///
/// Basic predictors always come first, then every `_rolling` column (four are
/// synthesized from the core stats when none exist), then the form columns for
/// `FeatureSet::Form`. A predictor the frame lacks is filled with its default.
pub fn assemble_training_data(frame: &ModelFrame, feature_set: FeatureSet) -> TrainingSet {
    let mut frame = frame.clone();
    if frame.rolling_columns().is_empty() && !frame.is_empty() {
        info!("no rolling columns present, synthesizing core stat means");
        frame.synthesize_default_rolling();
    }

    let mut predictors: Vec<String> = BASIC_PREDICTORS.iter().map(|s| s.to_string()).collect();
    predictors.extend(frame.rolling_columns());
    if feature_set == FeatureSet::Form {
        predictors.extend(frame.form_columns.iter().cloned());
    }

    let lookup: Vec<Option<usize>> = predictors.iter().map(|p| frame.column_index(p)).collect();
    let mut rows = Vec::with_capacity(frame.len());
    let mut dropped = 0;
    for row in &frame.rows {
        let features: Option<Vec<f64>> = lookup
            .iter()
            .zip(&predictors)
            .map(|(idx, name)| match idx {
                Some(i) => row.values[*i].filter(|v| v.is_finite()),
                None => Some(predictor_default(name)),
            })
            .collect();
        match features {
            Some(features) => rows.push(TrainingRow {
                record: row.record.clone(),
                features,
                target: row.target,
                synthetic: false,
            }),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        info!(dropped, kept = rows.len(), "dropped rows with missing predictors");
    }
    TrainingSet {
        predictors,
        rows,
        dropped,
    }
}
