//! Downstream analysis of search results.

pub mod roc;

pub use roc::{RocCurve, RocPoint};
