//! Labelled datasets: CSV ingestion, de-duplication and standardization.

pub mod dataset;
pub mod source;
pub mod transform;

pub use dataset::{Dataset, FeatureMatrix, Label, LabelVector};
pub use source::CsvSource;
pub use transform::{deduplicate, prepare, standardize};
