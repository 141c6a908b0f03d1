//! Dataset preparation: de-duplication and z-score standardization.

use crate::data::dataset::{Dataset, FeatureMatrix};
use crate::error::SearchError;
use std::collections::HashSet;

/// Drop rows whose feature vector repeats an earlier row, keeping the first.
///
/// Only features take part in the comparison; a duplicate with a different
/// label is dropped too.
pub fn deduplicate(dataset: Dataset) -> Result<Dataset, SearchError> {
    let before = dataset.len();
    let (names, features, labels) = dataset.into_parts();

    let mut seen: HashSet<Vec<u64>> = HashSet::with_capacity(before);
    let mut keep = Vec::with_capacity(before);
    for (i, row) in features.rows().iter().enumerate() {
        // Bit patterns so the row can be hashed; -0.0 folds into 0.0.
        let key: Vec<u64> = row.iter().map(|v| (v + 0.0).to_bits()).collect();
        if seen.insert(key) {
            keep.push(i);
        }
    }

    if keep.len() < before {
        tracing::info!(dropped = before - keep.len(), "Removed duplicate rows");
    }
    Dataset::new(names, features.select(&keep), labels.select(&keep))
}

/// Per-column z-score with population standard deviation.
///
/// A constant column has no spread and is mapped to zeros.
pub fn standardize(dataset: Dataset) -> Result<Dataset, SearchError> {
    let (names, features, labels) = dataset.into_parts();
    if features.is_empty() {
        return Dataset::new(names, features, labels);
    }

    let n = features.len() as f64;
    let stats: Vec<(f64, f64)> = (0..features.width())
        .map(|j| {
            let col = features.column(j);
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        })
        .collect();

    for (j, (_, std)) in stats.iter().enumerate() {
        if *std == 0.0 {
            tracing::warn!(column = %names[j], "Constant feature column standardized to zeros");
        }
    }

    let rows: Vec<Vec<f64>> = features
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .zip(&stats)
                .map(|(v, (mean, std))| if *std == 0.0 { 0.0 } else { (v - mean) / std })
                .collect()
        })
        .collect();

    Dataset::new(names, FeatureMatrix::new(rows)?, labels)
}

/// Apply the preparation steps switched on in `config`.
pub fn prepare(dataset: Dataset, config: &crate::config::DataConfig) -> Result<Dataset, SearchError> {
    let dataset = if config.deduplicate {
        deduplicate(dataset)?
    } else {
        dataset
    };
    if config.standardize {
        standardize(dataset)
    } else {
        Ok(dataset)
    }
}

/// Split a dataset by label, for per-class feature inspection.
pub fn partition_by_label(dataset: &Dataset) -> (FeatureMatrix, FeatureMatrix) {
    let (neg, pos): (Vec<usize>, Vec<usize>) =
        (0..dataset.len()).partition(|&i| dataset.labels().as_slice()[i] == 0);
    (dataset.features().select(&neg), dataset.features().select(&pos))
}
