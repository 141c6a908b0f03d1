//! ROC curve and AUC over held-out labels and raw prediction scores.

use crate::data::dataset::Label;
use crate::error::SearchError;
use crate::training::results::EvaluationRecord;
use serde::{Deserialize, Serialize};

/// One operating point. Scores `>= threshold` are called positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

impl RocCurve {
    /// Sweep thresholds over the distinct scores, highest first.
    ///
    /// The first point is `(0, 0)` at an infinite threshold and the last is
    /// `(1, 1)`. Both classes must be present.
    pub fn from_scores(labels: &[Label], scores: &[f64]) -> Result<Self, SearchError> {
        if labels.len() != scores.len() {
            return Err(SearchError::evaluation(format!(
                "{} labels but {} scores",
                labels.len(),
                scores.len()
            )));
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(SearchError::evaluation("NaN prediction score"));
        }
        let positives = labels.iter().filter(|&&l| l == 1).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(SearchError::evaluation(
                "ROC needs both positive and negative labels",
            ));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut points = vec![RocPoint {
            false_positive_rate: 0.0,
            true_positive_rate: 0.0,
            threshold: f64::INFINITY,
        }];
        let (mut tp, mut fp) = (0usize, 0usize);
        for (pos, &i) in order.iter().enumerate() {
            if labels[i] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            // Emit only once all rows sharing this score are counted.
            let last_of_score = order
                .get(pos + 1)
                .is_none_or(|&next| scores[next] != scores[i]);
            if last_of_score {
                points.push(RocPoint {
                    false_positive_rate: fp as f64 / negatives as f64,
                    true_positive_rate: tp as f64 / positives as f64,
                    threshold: scores[i],
                });
            }
        }

        let auc: f64 = points
            .windows(2)
            .map(|w| {
                (w[1].false_positive_rate - w[0].false_positive_rate)
                    * (w[1].true_positive_rate + w[0].true_positive_rate)
                    / 2.0
            })
            .sum();

        Ok(Self { points, auc })
    }

    /// Pool the held-out labels and predictions of several records, e.g. all
    /// folds of one configuration.
    pub fn pooled<'a>(records: impl IntoIterator<Item = &'a EvaluationRecord>) -> Result<Self, SearchError> {
        let mut labels = Vec::new();
        let mut scores = Vec::new();
        for record in records {
            labels.extend_from_slice(&record.test_labels);
            scores.extend_from_slice(&record.predictions);
        }
        Self::from_scores(&labels, &scores)
    }
}
