//! Training history and held-out evaluation metrics.

use serde::{Deserialize, Serialize};

/// Per-epoch loss and accuracy observed while fitting one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_epoch(&mut self, loss: f64, accuracy: f64) {
        self.loss.push(loss);
        self.accuracy.push(accuracy);
    }

    pub fn epochs_completed(&self) -> usize {
        self.loss.len()
    }

    /// Loss and accuracy of the last epoch, if any epoch ran.
    pub fn final_epoch(&self) -> Option<(f64, f64)> {
        Some((*self.loss.last()?, *self.accuracy.last()?))
    }

    /// Lowest loss seen and the (1-based) epoch it occurred in.
    pub fn best_epoch(&self) -> Option<(usize, f64)> {
        self.loss
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, l)| (i + 1, l))
    }
}

/// Loss and accuracy on held-out rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

impl Evaluation {
    pub fn is_finite(&self) -> bool {
        self.loss.is_finite() && self.accuracy.is_finite()
    }
}

/// Fraction of scores on the right side of 0.5.
pub fn binary_accuracy(targets: &[f64], scores: &[f64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = targets
        .iter()
        .zip(scores)
        .filter(|&(t, s)| (*s > 0.5) == (*t > 0.5))
        .count();
    correct as f64 / targets.len() as f64
}
