//! Reference feed-forward classifiers trained with mini-batch SGD.
//!
//! Two architectures are provided: a single sigmoid unit over the inputs,
//! and one hidden ReLU layer of three units feeding a sigmoid output. Both
//! minimise binary cross-entropy plus an optional kernel penalty.

use crate::algorithms::{ModelFamily, TrainableModel};
use crate::data::dataset::{FeatureMatrix, LabelVector};
use crate::error::SearchError;
use crate::training::metrics::{Evaluation, TrainingHistory, binary_accuracy};
use crate::training::params::ParamSet;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Plain SGD step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
/// Penalty factor for both L1 and L2 kernel regularization.
pub const REGULARIZATION_FACTOR: f64 = 0.01;
/// Units in the hidden layer of [`Architecture::Hidden`].
pub const HIDDEN_UNITS: usize = 3;

const DEFAULT_EPOCHS: u64 = 1;
const DEFAULT_BATCH_SIZE: u64 = 32;
const EPSILON: f64 = 1e-7;

/// Network layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// One sigmoid unit.
    Simple,
    /// ReLU hidden layer, then one sigmoid unit.
    Hidden,
}

impl Architecture {
    fn layers(self, input_dim: usize) -> Vec<(usize, usize, Activation)> {
        match self {
            Self::Simple => vec![(input_dim, 1, Activation::Sigmoid)],
            Self::Hidden => vec![
                (input_dim, HIDDEN_UNITS, Activation::Relu),
                (HIDDEN_UNITS, 1, Activation::Sigmoid),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Self::Relu => z.max(0.0),
            Self::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }

    /// Derivative expressed in terms of the activation's output.
    fn derivative(self, a: f64) -> f64 {
        match self {
            Self::Relu => {
                if a > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sigmoid => a * (1.0 - a),
        }
    }
}

/// Kernel weight penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularizer {
    #[default]
    None,
    L1,
    L2,
}

impl Regularizer {
    pub fn parse(name: Option<&str>) -> Result<Self, SearchError> {
        match name.map(str::to_ascii_lowercase).as_deref() {
            None | Some("none") => Ok(Self::None),
            Some("l1") => Ok(Self::L1),
            Some("l2") => Ok(Self::L2),
            Some(other) => Err(SearchError::configuration(format!(
                "unknown kernel_regularizer '{other}', expected l1, l2 or none"
            ))),
        }
    }

    fn penalty(self, w: f64) -> f64 {
        match self {
            Self::None => 0.0,
            Self::L1 => REGULARIZATION_FACTOR * w.abs(),
            Self::L2 => REGULARIZATION_FACTOR * w * w,
        }
    }

    fn gradient(self, w: f64) -> f64 {
        match self {
            Self::None => 0.0,
            Self::L1 if w == 0.0 => 0.0,
            Self::L1 => REGULARIZATION_FACTOR * w.signum(),
            Self::L2 => 2.0 * REGULARIZATION_FACTOR * w,
        }
    }
}

#[derive(Debug, Clone)]
struct DenseLayer {
    /// `weights[out][in]`
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    activation: Activation,
}

impl DenseLayer {
    /// Glorot-uniform kernel, zero bias.
    fn new(fan_in: usize, fan_out: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let weights = (0..fan_out)
            .map(|_| (0..fan_in).map(|_| rng.gen_range(-limit..=limit)).collect())
            .collect();
        Self {
            weights,
            bias: vec![0.0; fan_out],
            activation,
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b;
                self.activation.apply(z)
            })
            .collect()
    }
}

/// A small dense network. Built fresh for every fold and combination.
#[derive(Debug, Clone)]
pub struct DenseNet {
    label: String,
    input_dim: usize,
    layers: Vec<DenseLayer>,
    regularizer: Regularizer,
    learning_rate: f64,
    rng: StdRng,
}

impl DenseNet {
    pub fn new(
        label: impl Into<String>,
        architecture: Architecture,
        input_dim: usize,
        regularizer: Regularizer,
        learning_rate: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = architecture
            .layers(input_dim)
            .into_iter()
            .map(|(fan_in, fan_out, act)| DenseLayer::new(fan_in, fan_out, act, &mut rng))
            .collect();
        Self {
            label: label.into(),
            input_dim,
            layers,
            regularizer,
            learning_rate,
            rng,
        }
    }

    /// Activations per layer; index 0 is the input itself.
    fn forward(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(x.to_vec());
        for layer in &self.layers {
            let next = layer.forward(&acts[acts.len() - 1]);
            acts.push(next);
        }
        acts
    }

    fn score(&self, x: &[f64]) -> f64 {
        self.forward(x).last().and_then(|a| a.first().copied()).unwrap_or(0.5)
    }

    fn penalty(&self) -> f64 {
        self.layers
            .iter()
            .flat_map(|l| l.weights.iter().flatten())
            .map(|&w| self.regularizer.penalty(w))
            .sum()
    }

    fn check_width(&self, x: &FeatureMatrix) -> Result<(), String> {
        if !x.is_empty() && x.width() != self.input_dim {
            return Err(format!(
                "{}: expected {} features, got {}",
                self.label,
                self.input_dim,
                x.width()
            ));
        }
        Ok(())
    }

    /// One SGD step on the rows at `batch`. Returns the summed
    /// cross-entropy and correct-prediction count observed before the step.
    fn train_batch(&mut self, x: &FeatureMatrix, targets: &[f64], batch: &[usize]) -> (f64, usize) {
        let mut grad_w: Vec<Vec<Vec<f64>>> = self
            .layers
            .iter()
            .map(|l| vec![vec![0.0; l.weights[0].len()]; l.weights.len()])
            .collect();
        let mut grad_b: Vec<Vec<f64>> = self.layers.iter().map(|l| vec![0.0; l.bias.len()]).collect();
        let mut loss_sum = 0.0;
        let mut correct = 0;

        for &row in batch {
            let input = &x.rows()[row];
            let y = targets[row];
            let acts = self.forward(input);
            let p = acts[acts.len() - 1][0];
            loss_sum += cross_entropy(y, p);
            if (p > 0.5) == (y > 0.5) {
                correct += 1;
            }

            // Sigmoid output with cross-entropy: dL/dz = p - y.
            let mut delta = vec![p - y];
            for l in (0..self.layers.len()).rev() {
                for (o, d) in delta.iter().enumerate() {
                    for (i, a) in acts[l].iter().enumerate() {
                        grad_w[l][o][i] += d * a;
                    }
                    grad_b[l][o] += d;
                }
                if l > 0 {
                    let below = self.layers[l - 1].activation;
                    delta = (0..acts[l].len())
                        .map(|i| {
                            let back: f64 = self.layers[l]
                                .weights
                                .iter()
                                .zip(&delta)
                                .map(|(row, d)| row[i] * d)
                                .sum();
                            back * below.derivative(acts[l][i])
                        })
                        .collect();
                }
            }
        }

        let n = batch.len() as f64;
        let lr = self.learning_rate;
        let reg = self.regularizer;
        for (layer, (gw, gb)) in self.layers.iter_mut().zip(grad_w.iter().zip(&grad_b)) {
            for (row, grow) in layer.weights.iter_mut().zip(gw) {
                for (w, g) in row.iter_mut().zip(grow) {
                    *w -= lr * (g / n + reg.gradient(*w));
                }
            }
            for (b, g) in layer.bias.iter_mut().zip(gb) {
                *b -= lr * g / n;
            }
        }

        (loss_sum, correct)
    }
}

fn cross_entropy(y: f64, p: f64) -> f64 {
    let p = p.clamp(EPSILON, 1.0 - EPSILON);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

impl TrainableModel for DenseNet {
    fn fit(
        &mut self,
        x: &FeatureMatrix,
        y: &LabelVector,
        params: &ParamSet,
    ) -> Result<TrainingHistory, SearchError> {
        let epochs = params.positive_int("epochs", DEFAULT_EPOCHS)?;
        let batch_size = params.positive_int("batch_size", DEFAULT_BATCH_SIZE)? as usize;
        let verbose = params.non_negative_int("verbose", 0)?;

        self.check_width(x).map_err(SearchError::training)?;
        if x.is_empty() {
            return Err(SearchError::training(format!("{}: no training rows", self.label)));
        }
        if x.len() != y.len() {
            return Err(SearchError::training(format!(
                "{}: {} rows but {} labels",
                self.label,
                x.len(),
                y.len()
            )));
        }

        let targets = y.as_targets();
        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut history = TrainingHistory::new();

        for epoch in 1..=epochs {
            order.shuffle(&mut self.rng);
            let mut loss_sum = 0.0;
            let mut penalty_sum = 0.0;
            let mut correct = 0;
            for batch in order.chunks(batch_size) {
                penalty_sum += self.penalty() * batch.len() as f64;
                let (l, c) = self.train_batch(x, &targets, batch);
                loss_sum += l;
                correct += c;
            }
            let n = x.len() as f64;
            let loss = (loss_sum + penalty_sum) / n;
            let accuracy = correct as f64 / n;

            if !loss.is_finite() {
                return Err(SearchError::training(format!(
                    "{}: loss diverged at epoch {epoch}",
                    self.label
                )));
            }
            if verbose > 0 {
                tracing::info!(model = %self.label, epoch, loss, accuracy, "Epoch complete");
            }
            history.record_epoch(loss, accuracy);
        }

        Ok(history)
    }

    fn evaluate(&self, x: &FeatureMatrix, y: &LabelVector) -> Result<Evaluation, SearchError> {
        if x.is_empty() {
            return Err(SearchError::evaluation(format!("{}: no held-out rows", self.label)));
        }
        let scores = self.predict(x)?;
        let targets = y.as_targets();
        let ce = targets
            .iter()
            .zip(&scores)
            .map(|(t, p)| cross_entropy(*t, *p))
            .sum::<f64>()
            / targets.len() as f64;
        Ok(Evaluation {
            loss: ce + self.penalty(),
            accuracy: binary_accuracy(&targets, &scores),
        })
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, SearchError> {
        self.check_width(x).map_err(SearchError::evaluation)?;
        Ok(x.rows().iter().map(|row| self.score(row)).collect())
    }
}

/// A [`ModelFamily`] producing [`DenseNet`] instances.
///
/// Every instance starts from the same seed, so a given combination and fold
/// always trains identically.
#[derive(Debug, Clone)]
pub struct NeuralFamily {
    name: String,
    architecture: Architecture,
    seed: u64,
    learning_rate: f64,
}

impl NeuralFamily {
    pub fn new(name: impl Into<String>, architecture: Architecture, seed: u64) -> Self {
        Self {
            name: name.into(),
            architecture,
            seed,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn into_shared(self) -> Arc<dyn ModelFamily> {
        Arc::new(self)
    }
}

impl ModelFamily for NeuralFamily {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(
        &self,
        params: &ParamSet,
        input_dim: usize,
    ) -> Result<Box<dyn TrainableModel>, SearchError> {
        if input_dim == 0 {
            return Err(SearchError::configuration(format!(
                "{}: cannot build a network over zero features",
                self.name
            )));
        }
        let regularizer = Regularizer::parse(params.optional_str("kernel_regularizer")?)?;
        Ok(Box::new(DenseNet::new(
            self.name.clone(),
            self.architecture,
            input_dim,
            regularizer,
            self.learning_rate,
            self.seed,
        )))
    }
}
