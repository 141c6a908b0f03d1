//! Cross-validated hyperparameter search: grids, folds, the engine, and
//! what happens to its records afterwards.

pub mod aggregate;
pub mod engine;
pub mod folds;
pub mod grid;
pub mod metrics;
pub mod params;
pub mod partition;
pub mod rank;
pub mod results;

pub use aggregate::{AggregatedSummary, GroupSummary, MetricStats, aggregate, aggregate_records};
pub use engine::{FamilySpec, SearchEngine};
pub use folds::{Fold, StratifiedKFold};
pub use grid::{GridIter, HyperparamGrid};
pub use metrics::{Evaluation, TrainingHistory};
pub use params::{ParamCombination, ParamSet, ParamValue};
pub use partition::{ParamSchema, PartitionedParams};
pub use rank::{rank_groups, rank_records};
pub use results::{EvaluationRecord, GroupKey, ResultTable};
