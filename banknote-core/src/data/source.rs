//! CSV loading for labelled feature tables.

use crate::data::dataset::{Dataset, FeatureMatrix, Label, LabelVector};
use crate::error::SearchError;
use std::path::PathBuf;

/// Default name of the label column in the banknote table.
pub const DEFAULT_LABEL_COLUMN: &str = "class";

/// CSV file data source.
///
/// The first line is a header. Every column except `label_column` becomes a
/// feature, in file order.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: char,
    pub label_column: String,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: ',',
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
        }
    }

    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn load(&self) -> Result<Dataset, SearchError> {
        let content = std::fs::read_to_string(&self.path)?;
        let dataset = parse_csv(&content, self.delimiter, &self.label_column)
            .map_err(|e| SearchError::dataset(format!("{}: {e}", self.path.display())))?;
        tracing::info!(
            path = %self.path.display(),
            rows = dataset.len(),
            features = dataset.features().width(),
            "Loaded dataset"
        );
        Ok(dataset)
    }
}

/// Parse CSV text into a [`Dataset`].
pub fn parse_csv(content: &str, delimiter: char, label_column: &str) -> Result<Dataset, SearchError> {
    let mut lines = content.lines();

    let columns: Vec<String> = lines
        .next()
        .ok_or_else(|| SearchError::dataset("Empty CSV file"))?
        .split(delimiter)
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    let label_idx = columns
        .iter()
        .position(|c| c == label_column)
        .ok_or_else(|| SearchError::dataset(format!("missing label column '{label_column}'")))?;

    let feature_names: Vec<String> = columns
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != label_idx)
        .map(|(_, c)| c.clone())
        .collect();

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        // Header is line 1.
        let line_no = line_no + 2;
        let cells: Vec<&str> = line
            .split(delimiter)
            .map(|s| s.trim().trim_matches('"'))
            .collect();
        if cells.len() != columns.len() {
            return Err(SearchError::dataset(format!(
                "line {line_no}: {} cells, expected {}",
                cells.len(),
                columns.len()
            )));
        }

        let mut row = Vec::with_capacity(feature_names.len());
        for (i, cell) in cells.iter().enumerate() {
            if i == label_idx {
                labels.push(parse_label(cell, line_no)?);
            } else {
                let v = cell.parse::<f64>().map_err(|_| {
                    SearchError::dataset(format!(
                        "line {line_no}: non-numeric value '{cell}' in column '{}'",
                        columns[i]
                    ))
                })?;
                row.push(v);
            }
        }
        rows.push(row);
    }

    Dataset::new(
        feature_names,
        FeatureMatrix::new(rows)?,
        LabelVector::new(labels)?,
    )
}

fn parse_label(cell: &str, line_no: usize) -> Result<Label, SearchError> {
    if let Ok(l) = cell.parse::<u8>() {
        return Ok(l);
    }
    match cell.parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(SearchError::dataset(format!(
            "line {line_no}: label '{cell}' is not 0 or 1"
        ))),
    }
}
