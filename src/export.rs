use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::info;

use crate::feature_generator::FeatureRow;
use crate::model::TrainedModel;

pub struct ExportReport {
    pub feature_rows: usize,
    pub feature_columns: usize,
    pub importance_rows: usize,
}

enum Cell {
    Text(String),
    Number(f64),
    Blank,
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Blank,
        }
    }
}

const IDENTITY_COLUMNS: [&str; 6] = ["Date", "Team", "Opponent", "Venue", "Result", "Match ID"];

fn feature_sheet(rows: &[FeatureRow]) -> (Vec<Vec<Cell>>, usize) {
    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let named: Vec<Vec<(String, Option<f64>)>> = rows.iter().map(|r| r.named_values()).collect();
    for values in &named {
        for (name, _) in values {
            if !seen.contains_key(name) {
                seen.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
    }

    let mut header: Vec<Cell> = IDENTITY_COLUMNS.iter().map(|&c| Cell::from(c)).collect();
    header.extend(columns.iter().map(|c| Cell::from(c.as_str())));
    let mut out = vec![header];
    for (row, values) in rows.iter().zip(&named) {
        let r = &row.record;
        let mut cells = vec![
            Cell::Text(r.date.format("%Y-%m-%d").to_string()),
            Cell::from(r.team.as_str()),
            Cell::from(r.opponent.as_str()),
            Cell::from(r.venue.label()),
            Cell::from(r.result.label()),
            Cell::from(r.match_id.as_deref().unwrap_or_default()),
        ];
        let mut numbers: Vec<Option<f64>> = vec![None; columns.len()];
        for (name, v) in values {
            if let Some(&i) = seen.get(name) {
                numbers[i] = *v;
            }
        }
        cells.extend(numbers.into_iter().map(Cell::from));
        out.push(cells);
    }
    (out, columns.len())
}

fn model_sheets(model: &TrainedModel) -> (Vec<Vec<Cell>>, Vec<Vec<Cell>>) {
    let mut importance = vec![vec![Cell::from("Feature"), Cell::from("Importance")]];
    for (feature, value) in model.get_feature_importance() {
        importance.push(vec![Cell::Text(feature), Cell::Number(value)]);
    }

    let mut summary = vec![vec![Cell::from("Key"), Cell::from("Value")]];
    summary.push(vec![Cell::from("model_type"), Cell::from(model.kind.tag())]);
    summary.push(vec![Cell::from("version"), Cell::from(model.version.as_str())]);
    summary.push(vec![Cell::from("state"), Cell::from(model.state_label())]);
    for (key, value) in model.hyperparameters() {
        let cell = match value.as_f64() {
            Some(n) => Cell::Number(n),
            None => Cell::Text(value.to_string()),
        };
        summary.push(vec![Cell::Text(key), cell]);
    }
    if let Some(metrics) = model.metrics() {
        for (key, value) in metrics.to_map() {
            summary.push(vec![Cell::Text(key), Cell::Number(value)]);
        }
    }
    (importance, summary)
}

/// Workbook with a `Features` sheet and, when a model is given, its
/// `Importance` ranking and a `Model` summary.
pub fn export_features(
    path: &Path,
    rows: &[FeatureRow],
    model: Option<&TrainedModel>,
) -> Result<ExportReport> {
    let (features, feature_columns) = feature_sheet(rows);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Features")?;
        write_rows(sheet, &features)?;
    }
    let mut importance_rows = 0;
    if let Some(model) = model {
        let (importance, summary) = model_sheets(model);
        importance_rows = importance.len().saturating_sub(1);
        {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Importance")?;
            write_rows(sheet, &importance)?;
        }
        {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Model")?;
            write_rows(sheet, &summary)?;
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export directory {}", parent.display()))?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    let report = ExportReport {
        feature_rows: rows.len(),
        feature_columns,
        importance_rows,
    };
    info!(
        path = %path.display(),
        rows = report.feature_rows,
        columns = report.feature_columns,
        "feature workbook written"
    );
    Ok(report)
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<Cell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            match value {
                Cell::Text(s) => worksheet.write_string(r, c, s).map(|_| ()),
                Cell::Number(n) => worksheet.write_number(r, c, *n).map(|_| ()),
                Cell::Blank => Ok(()),
            }
            .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_generator::FeatureGenerator;
    use crate::model::{ModelConfig, ModelKind};
    use crate::sample_data::SampleSeason;

    #[test]
    fn feature_sheet_has_header_and_identity_columns() {
        let season = SampleSeason::generate(4, 5);
        let rows = FeatureGenerator::default().generate(&season.records);
        let (sheet, columns) = feature_sheet(&rows);
        assert_eq!(sheet.len(), rows.len() + 1);
        assert!(columns > 20);
        assert!(sheet.iter().all(|r| r.len() == IDENTITY_COLUMNS.len() + columns));
        assert!(matches!(&sheet[0][1], Cell::Text(s) if s == "Team"));
    }

    #[test]
    fn writes_workbook_with_model_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/features.xlsx");
        let season = SampleSeason::generate(4, 5);
        let rows = FeatureGenerator::default().generate(&season.records);
        let model = TrainedModel::new(
            ModelKind::RandomForest,
            vec!["venue_code".to_string()],
            ModelConfig::default(),
        );
        let report = export_features(&path, &rows, Some(&model)).unwrap();
        assert_eq!(report.feature_rows, 24);
        assert_eq!(report.importance_rows, 1);
        assert!(path.exists());
    }

    #[test]
    fn unusable_output_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();
        let rows = FeatureGenerator::default().generate(&SampleSeason::generate(2, 1).records);
        let err = match export_features(&blocker.join("features.xlsx"), &rows, None) {
            Ok(_) => panic!("export into a file path succeeded"),
            Err(err) => err,
        };
        assert!(format!("{err:#}").contains("create export directory"), "{err:#}");
    }
}
