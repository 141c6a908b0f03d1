//! Model abstractions consumed by the search engine, plus the reference
//! neural-network families.

pub mod neural;

pub use neural::{Architecture, NeuralFamily, Regularizer};

use crate::data::dataset::{FeatureMatrix, LabelVector};
use crate::error::SearchError;
use crate::training::metrics::{Evaluation, TrainingHistory};
use crate::training::params::ParamSet;

/// A model instance that can be trained once and then queried.
pub trait TrainableModel: Send {
    /// Train on `x`/`y` using fit-time parameters (epochs, batch size,
    /// verbosity). Returns the per-epoch history.
    fn fit(
        &mut self,
        x: &FeatureMatrix,
        y: &LabelVector,
        params: &ParamSet,
    ) -> Result<TrainingHistory, SearchError>;

    /// Loss and accuracy on held-out rows.
    fn evaluate(&self, x: &FeatureMatrix, y: &LabelVector) -> Result<Evaluation, SearchError>;

    /// Raw scores, one per row of `x`.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, SearchError>;
}

/// A named model family able to build fresh, untrained instances.
pub trait ModelFamily: Send + Sync {
    fn name(&self) -> &str;

    /// Build a new instance from construction-time parameters. `input_dim`
    /// is the feature width of the dataset being searched.
    fn construct(
        &self,
        params: &ParamSet,
        input_dim: usize,
    ) -> Result<Box<dyn TrainableModel>, SearchError>;
}
