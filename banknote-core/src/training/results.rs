//! Evaluation records and the append-only result table.

use crate::data::dataset::Label;
use crate::error::SearchError;
use crate::training::params::ParamSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of training and testing one model on one fold with one
/// parameter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub model_name: String,
    pub construction_params: ParamSet,
    pub fit_params: ParamSet,
    pub fold: usize,
    /// Loss at the final training epoch.
    pub train_loss: f64,
    /// Accuracy at the final training epoch.
    pub train_accuracy: f64,
    pub test_loss: f64,
    pub test_accuracy: f64,
    /// True labels of the held-out rows.
    pub test_labels: Vec<Label>,
    /// Raw model scores for the held-out rows, in the same order.
    pub predictions: Vec<f64>,
}

impl EvaluationRecord {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            model_name: self.model_name.clone(),
            construction_params: self.construction_params.clone(),
            fit_params: self.fit_params.clone(),
        }
    }
}

/// Identity of one configuration: model plus both parameter halves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub model_name: String,
    pub construction_params: ParamSet,
    pub fit_params: ParamSet,
}

/// All records produced by one search, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTable {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Fingerprint of the configuration that drove the search, if known.
    pub config_fingerprint: Option<String>,
    records: Vec<EvaluationRecord>,
}

impl Default for ResultTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultTable {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            config_fingerprint: None,
            records: Vec::new(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.config_fingerprint = fingerprint;
        self
    }

    /// Append one record. Records already in the table are never touched.
    pub fn push(&mut self, record: EvaluationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvaluationRecord> {
        self.records.iter()
    }

    pub fn by_model<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EvaluationRecord> {
        self.records.iter().filter(move |r| r.model_name == name)
    }

    /// Records bucketed by configuration, keyed in sorted order.
    pub fn groups(&self) -> BTreeMap<GroupKey, Vec<&EvaluationRecord>> {
        let mut groups: BTreeMap<GroupKey, Vec<&EvaluationRecord>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.group_key()).or_default().push(record);
        }
        groups
    }

    /// Records belonging to one configuration.
    pub fn group<'a>(&'a self, key: &'a GroupKey) -> impl Iterator<Item = &'a EvaluationRecord> {
        self.records.iter().filter(move |r| {
            r.model_name == key.model_name
                && r.construction_params == key.construction_params
                && r.fit_params == key.fit_params
        })
    }

    pub fn load(path: &std::path::Path) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), SearchError> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a EvaluationRecord;
    type IntoIter = std::slice::Iter<'a, EvaluationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Extend<EvaluationRecord> for ResultTable {
    fn extend<I: IntoIterator<Item = EvaluationRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}
