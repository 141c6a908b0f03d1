//! Orderings for reporting.

use crate::training::aggregate::{AggregatedSummary, GroupSummary};
use crate::training::results::EvaluationRecord;

/// Records by ascending test loss, ties by ascending test accuracy. Stable.
pub fn rank_records<'a>(records: impl IntoIterator<Item = &'a EvaluationRecord>) -> Vec<&'a EvaluationRecord> {
    let mut ranked: Vec<_> = records.into_iter().collect();
    ranked.sort_by(|a, b| {
        a.test_loss
            .total_cmp(&b.test_loss)
            .then(a.test_accuracy.total_cmp(&b.test_accuracy))
    });
    ranked
}

/// Groups by descending mean test accuracy, best configuration first. Stable.
pub fn rank_groups(summary: &AggregatedSummary) -> Vec<&GroupSummary> {
    let mut ranked: Vec<_> = summary.rows().iter().collect();
    ranked.sort_by(|a, b| b.test_accuracy.mean.total_cmp(&a.test_accuracy.mean));
    ranked
}
