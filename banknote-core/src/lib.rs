//! # banknote-core: cross-validated model selection
//!
//! Expands hyperparameter grids, splits a labelled dataset into stratified
//! folds, trains a fresh model per (family, combination, fold), and collects
//! one evaluation record per run. Records can then be aggregated per
//! configuration, ranked, exported, and turned into ROC curves.
//!
//! ## Layout
//!
//! - [`data`] loads and prepares the feature matrix and labels
//! - [`training`] holds the grid, fold splitter, engine and result handling
//! - [`algorithms`] defines the model traits and the reference networks
//! - [`eval`] computes ROC curves from held-out predictions

// Foundation
pub mod config;
pub mod error;

// Data
pub mod data;

// Search
pub mod training;

// Models
pub mod algorithms;

// Post-hoc evaluation
pub mod eval;

// Re-exports
pub use algorithms::{Architecture, ModelFamily, NeuralFamily, TrainableModel};
pub use config::{ConfigSources, SearchConfig, load_config};
pub use data::{CsvSource, Dataset, FeatureMatrix, LabelVector};
pub use error::SearchError;
pub use eval::RocCurve;
pub use training::{
    AggregatedSummary, EvaluationRecord, GroupKey, GroupSummary, HyperparamGrid, ParamSchema,
    ResultTable, SearchEngine, StratifiedKFold, aggregate, rank_groups, rank_records,
};
