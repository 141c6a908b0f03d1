//! Error types for the banknote-core crate.

use thiserror::Error;

/// Top-level error type for a model-selection search.
///
/// Every variant aborts the search that raised it; the engine never retries
/// or salvages partial results.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Training failure: {0}")]
    Training(String),

    #[error("Evaluation failure: {0}")]
    Evaluation(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SearchError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Whether this error came from a bad search definition rather than from a
    /// model misbehaving mid-run.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<Box<figment::Error>> for SearchError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_kind() {
        let err = SearchError::training("loss became NaN at epoch 3");
        assert_eq!(
            err.to_string(),
            "Training failure: loss became NaN at epoch 3"
        );
        assert!(!err.is_configuration());
        assert!(SearchError::configuration("empty grid").is_configuration());
    }
}
