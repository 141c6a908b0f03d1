//! In-memory dataset: feature matrix plus parallel binary labels.

use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Class label. The banknote data uses `0` for authentic and `1` for forged.
pub type Label = u8;

/// Row-major matrix of fixed-width feature vectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    width: usize,
}

impl FeatureMatrix {
    /// Build a matrix, rejecting ragged rows.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, SearchError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(SearchError::dataset(format!(
                "row {i} has {} features, expected {width}",
                row.len()
            )));
        }
        Ok(Self { rows, width })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of features per row.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Values of one feature column, top to bottom.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[index]).collect()
    }

    /// Copy out the given rows, in the order of `indices`.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            width: self.width,
        }
    }
}

/// Binary labels parallel to a [`FeatureMatrix`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelVector(Vec<Label>);

impl LabelVector {
    /// Build a label vector, rejecting anything other than `0` and `1`.
    pub fn new(labels: Vec<Label>) -> Result<Self, SearchError> {
        if let Some((i, l)) = labels.iter().enumerate().find(|(_, l)| **l > 1) {
            return Err(SearchError::dataset(format!(
                "label {l} at row {i} is not binary"
            )));
        }
        Ok(Self(labels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        Self(indices.iter().map(|&i| self.0[i]).collect())
    }

    /// Member count per class present in the data, keyed by label.
    pub fn class_counts(&self) -> BTreeMap<Label, usize> {
        let mut counts = BTreeMap::new();
        for &label in &self.0 {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    /// Fraction of labels equal to `1`. Zero for an empty vector.
    pub fn positive_rate(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().filter(|&&l| l == 1).count() as f64 / self.0.len() as f64
    }

    /// Labels as `f64` targets for a loss function.
    pub fn as_targets(&self) -> Vec<f64> {
        self.0.iter().map(|&l| f64::from(l)).collect()
    }
}

/// Features, labels, and feature column names.
///
/// Immutable once built; folds materialise their rows through [`Dataset::select`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: FeatureMatrix,
    labels: LabelVector,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: FeatureMatrix,
        labels: LabelVector,
    ) -> Result<Self, SearchError> {
        if features.len() != labels.len() {
            return Err(SearchError::dataset(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if !features.is_empty() && feature_names.len() != features.width() {
            return Err(SearchError::dataset(format!(
                "{} feature names for {} feature columns",
                feature_names.len(),
                features.width()
            )));
        }
        Ok(Self {
            feature_names,
            features,
            labels,
        })
    }

    /// Build from raw rows, naming the columns `f0`, `f1`, ...
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<Label>) -> Result<Self, SearchError> {
        let features = FeatureMatrix::new(rows)?;
        let names = (0..features.width()).map(|i| format!("f{i}")).collect();
        Self::new(names, features, LabelVector::new(labels)?)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn labels(&self) -> &LabelVector {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Rows and labels at `indices`, preserving their order.
    pub fn select(&self, indices: &[usize]) -> (FeatureMatrix, LabelVector) {
        (self.features.select(indices), self.labels.select(indices))
    }

    /// Split into owned parts, for transforms that rebuild the dataset.
    pub fn into_parts(self) -> (Vec<String>, FeatureMatrix, LabelVector) {
        (self.feature_names, self.features, self.labels)
    }
}
