//! Per-configuration summary statistics across folds.

use crate::training::params::ParamSet;
use crate::training::results::{EvaluationRecord, GroupKey, ResultTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean, sample standard deviation, min and max of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    /// Summarise `values`. Standard deviation uses `n - 1` and is `0.0` for a
    /// single value; an empty slice yields NaN everywhere.
    ///
    /// Values are sorted before summation so the result does not depend on
    /// the order they arrive in.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = if sorted.len() > 1 {
            let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };
        Self {
            mean,
            std,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Summary row for one (model, construction params, fit params) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub model_name: String,
    pub construction_params: ParamSet,
    pub fit_params: ParamSet,
    /// Number of fold records in the group.
    pub folds: usize,
    pub train_loss: MetricStats,
    pub train_accuracy: MetricStats,
    pub test_loss: MetricStats,
    pub test_accuracy: MetricStats,
}

impl GroupSummary {
    fn from_group(key: GroupKey, members: &[&EvaluationRecord]) -> Self {
        let stats = |metric: fn(&EvaluationRecord) -> f64| {
            let values: Vec<f64> = members.iter().map(|r| metric(r)).collect();
            MetricStats::from_values(&values)
        };
        Self {
            folds: members.len(),
            train_loss: stats(|r| r.train_loss),
            train_accuracy: stats(|r| r.train_accuracy),
            test_loss: stats(|r| r.test_loss),
            test_accuracy: stats(|r| r.test_accuracy),
            model_name: key.model_name,
            construction_params: key.construction_params,
            fit_params: key.fit_params,
        }
    }

    pub fn key(&self) -> GroupKey {
        GroupKey {
            model_name: self.model_name.clone(),
            construction_params: self.construction_params.clone(),
            fit_params: self.fit_params.clone(),
        }
    }
}

/// One summary row per configuration, ordered by group key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSummary {
    rows: Vec<GroupSummary>,
}

impl AggregatedSummary {
    pub fn rows(&self) -> &[GroupSummary] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn find(&self, key: &GroupKey) -> Option<&GroupSummary> {
        self.rows.iter().find(|r| {
            r.model_name == key.model_name
                && r.construction_params == key.construction_params
                && r.fit_params == key.fit_params
        })
    }
}

/// Group `records` by configuration and summarise each group.
pub fn aggregate_records<'a>(records: impl IntoIterator<Item = &'a EvaluationRecord>) -> AggregatedSummary {
    let mut groups: BTreeMap<GroupKey, Vec<&EvaluationRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.group_key()).or_default().push(record);
    }
    let rows = groups
        .into_iter()
        .map(|(key, members)| GroupSummary::from_group(key, &members))
        .collect();
    AggregatedSummary { rows }
}

/// Summarise a finished search.
pub fn aggregate(table: &ResultTable) -> AggregatedSummary {
    aggregate_records(table.records())
}
