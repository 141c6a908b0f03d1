//! Stratified k-fold splitting.

use crate::data::dataset::{Label, LabelVector};
use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of folds for a search.
pub const DEFAULT_FOLDS: usize = 5;

/// One train/test split. Both index lists are ascending and disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Deterministic stratified k-fold splitter.
///
/// No shuffling: indices are handed out in input order, so identical labels
/// always produce identical folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl Default for StratifiedKFold {
    fn default() -> Self {
        Self {
            n_splits: DEFAULT_FOLDS,
        }
    }
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Result<Self, SearchError> {
        if n_splits < 2 {
            return Err(SearchError::configuration(format!(
                "fold count must be at least 2, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Split `labels` into `n_splits` folds.
    ///
    /// Each class contributes ⌊c/k⌋ or ⌈c/k⌉ of its `c` members to every test
    /// set. Which folds get the extra member is chosen across classes so fold
    /// sizes differ by at most one.
    pub fn split(&self, labels: &LabelVector) -> Result<Vec<Fold>, SearchError> {
        let k = self.n_splits;
        if labels.is_empty() {
            return Err(SearchError::configuration("cannot split an empty label vector"));
        }

        let counts = labels.class_counts();
        if let Some((label, count)) = counts.iter().find(|(_, c)| **c < k) {
            return Err(SearchError::configuration(format!(
                "class {label} has {count} members, fewer than the {k} folds requested"
            )));
        }

        // Classes are ranked by first appearance in the input. Walk the
        // class-sorted vector with stride k: fold f receives the classes
        // found at positions f, f+k, f+2k, ...
        let mut order: Vec<Label> = Vec::with_capacity(counts.len());
        for label in labels.as_slice() {
            if !order.contains(label) {
                order.push(*label);
            }
        }
        let sorted: Vec<Label> = order
            .iter()
            .flat_map(|label| std::iter::repeat_n(*label, counts.get(label).copied().unwrap_or(0)))
            .collect();
        let mut quota: Vec<BTreeMap<Label, usize>> = vec![BTreeMap::new(); k];
        for (pos, label) in sorted.iter().enumerate() {
            *quota[pos % k].entry(*label).or_insert(0) += 1;
        }

        let mut by_class: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        for (i, label) in labels.as_slice().iter().enumerate() {
            by_class.entry(*label).or_default().push(i);
        }

        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (label, indices) in &by_class {
            let mut start = 0;
            for (f, test) in tests.iter_mut().enumerate() {
                let take = quota[f].get(label).copied().unwrap_or(0);
                test.extend_from_slice(&indices[start..start + take]);
                start += take;
            }
        }

        let n = labels.len();
        let folds = tests
            .into_iter()
            .enumerate()
            .map(|(index, mut test)| {
                test.sort_unstable();
                let mut in_test = vec![false; n];
                for &i in &test {
                    in_test[i] = true;
                }
                let train = (0..n).filter(|&i| !in_test[i]).collect();
                Fold { index, train, test }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            folds = k,
            sizes = ?folds.iter().map(|f| f.test.len()).collect::<Vec<_>>(),
            "Built stratified folds"
        );
        Ok(folds)
    }
}
