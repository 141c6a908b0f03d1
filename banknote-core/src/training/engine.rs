//! The cross-validated hyperparameter search loop.
//!
//! For every model family, every combination of its grid, and every fold,
//! the engine builds a fresh model, fits it on the fold's training rows,
//! evaluates it on the held-out rows, and appends one [`EvaluationRecord`].
//! Any failure aborts the whole search.

use crate::algorithms::{Architecture, ModelFamily, NeuralFamily};
use crate::config::SearchConfig;
use crate::data::dataset::Dataset;
use crate::error::SearchError;
use crate::training::folds::{Fold, StratifiedKFold};
use crate::training::grid::HyperparamGrid;
use crate::training::partition::{ParamSchema, PartitionedParams};
use crate::training::results::{EvaluationRecord, ResultTable};
use std::sync::Arc;
use tokio::task::JoinSet;

/// A model family together with the grid it is searched over.
#[derive(Clone)]
pub struct FamilySpec {
    pub family: Arc<dyn ModelFamily>,
    pub grid: HyperparamGrid,
}

impl std::fmt::Debug for FamilySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilySpec")
            .field("family", &self.family.name())
            .field("grid", &self.grid)
            .finish()
    }
}

/// One unit of work: a family, one partitioned combination, one fold.
#[derive(Debug, Clone)]
struct Job {
    family: usize,
    params: Arc<PartitionedParams>,
    fold: usize,
}

/// Everything derived from the configuration and dataset before training
/// starts. Building the plan performs all configuration checks.
#[derive(Debug)]
struct SearchPlan {
    folds: Vec<Fold>,
    jobs: Vec<Job>,
}

/// Cross-validated grid search over a set of model families.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    schema: ParamSchema,
    splitter: StratifiedKFold,
    families: Vec<FamilySpec>,
    fingerprint: Option<String>,
    max_parallel: usize,
}

impl SearchEngine {
    pub fn new(schema: ParamSchema, n_folds: usize) -> Result<Self, SearchError> {
        schema.validate()?;
        Ok(Self {
            schema,
            splitter: StratifiedKFold::new(n_folds)?,
            families: Vec::new(),
            fingerprint: None,
            max_parallel: default_parallelism(),
        })
    }

    /// Build an engine with the reference neural families described by
    /// `config`.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let mut engine = Self::new(config.params.clone(), config.folds)?
            .with_fingerprint(config.fingerprint()?)
            .with_max_parallel(config.max_parallel);
        for family in &config.families {
            engine = engine.with_family(
                neural_family(&family.name, family.architecture, config.seed, family.learning_rate),
                family.grid.clone(),
            );
        }
        Ok(engine)
    }

    pub fn with_family(mut self, family: Arc<dyn ModelFamily>, grid: HyperparamGrid) -> Self {
        self.families.push(FamilySpec { family, grid });
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Upper bound on concurrently running jobs in [`Self::evaluate_parallel`].
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn families(&self) -> &[FamilySpec] {
        &self.families
    }

    pub fn n_folds(&self) -> usize {
        self.splitter.n_splits()
    }

    /// Number of records a successful search over any valid dataset emits.
    pub fn expected_records(&self) -> usize {
        self.families.iter().map(|f| f.grid.len()).sum::<usize>() * self.n_folds()
    }

    fn plan(&self, dataset: &Dataset) -> Result<SearchPlan, SearchError> {
        if self.families.is_empty() {
            return Err(SearchError::configuration("no model families to search"));
        }
        if dataset.features().width() == 0 {
            return Err(SearchError::configuration("dataset has no feature columns"));
        }

        let mut partitioned = Vec::with_capacity(self.families.len());
        for spec in &self.families {
            let name = spec.family.name();
            let empty = spec.grid.empty_names();
            if !empty.is_empty() {
                return Err(SearchError::configuration(format!(
                    "grid for '{name}' has no candidate values for: {}",
                    empty.join(", ")
                )));
            }
            self.schema.validate_grid(name, &spec.grid)?;
            let combos = spec
                .grid
                .iter()
                .map(|combo| self.schema.partition(&combo).map(Arc::new))
                .collect::<Result<Vec<_>, _>>()?;
            partitioned.push(combos);
        }

        let folds = self.splitter.split(dataset.labels())?;
        let n_folds = folds.len();

        let jobs = partitioned
            .iter()
            .enumerate()
            .flat_map(|(family, combos)| {
                combos.iter().flat_map(move |params| {
                    (0..n_folds).map(move |fold| Job {
                        family,
                        params: Arc::clone(params),
                        fold,
                    })
                })
            })
            .collect();

        Ok(SearchPlan { folds, jobs })
    }

    /// Run the search sequentially.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<ResultTable, SearchError> {
        let plan = self.plan(dataset)?;
        let mut table = ResultTable::new().with_fingerprint(self.fingerprint.clone());
        let per_family = self.combinations_per_family();

        let mut current: Option<usize> = None;
        let mut combo_no = 0;
        for job in &plan.jobs {
            let spec = &self.families[job.family];
            if current != Some(job.family) {
                current = Some(job.family);
                combo_no = 0;
                tracing::info!(
                    model = spec.family.name(),
                    combinations = per_family[job.family],
                    folds = plan.folds.len(),
                    "Training model family"
                );
            }
            if job.fold == 0 {
                combo_no += 1;
                tracing::info!(
                    model = spec.family.name(),
                    progress = %format!("{combo_no}/{}", per_family[job.family]),
                    construction = %job.params.construction,
                    fit = %job.params.fit,
                    "Evaluating combination"
                );
            }
            let record = run_job(spec.family.as_ref(), &job.params, &plan.folds[job.fold], dataset)?;
            table.push(record);
        }

        tracing::info!(records = table.len(), run_id = %table.run_id, "Search complete");
        Ok(table)
    }

    /// Run the search with jobs spread over the blocking thread pool.
    ///
    /// Produces the same records, in the same order, as [`Self::evaluate`].
    /// The first failing job aborts the search: no further jobs are started
    /// and the error is returned at once. Jobs already running on the
    /// blocking pool cannot be interrupted; they train to completion in the
    /// background and their results are dropped.
    pub async fn evaluate_parallel(&self, dataset: Arc<Dataset>) -> Result<ResultTable, SearchError> {
        let plan = self.plan(&dataset)?;
        let folds = Arc::new(plan.folds);
        let total = plan.jobs.len();
        tracing::info!(
            jobs = total,
            max_parallel = self.max_parallel,
            "Starting parallel search"
        );

        let mut slots: Vec<Option<EvaluationRecord>> = vec![None; total];
        let mut set: JoinSet<(usize, Result<EvaluationRecord, SearchError>)> = JoinSet::new();
        let mut pending = plan.jobs.into_iter().enumerate();

        loop {
            while set.len() < self.max_parallel {
                let Some((slot, job)) = pending.next() else {
                    break;
                };
                let family = Arc::clone(&self.families[job.family].family);
                let dataset = Arc::clone(&dataset);
                let folds = Arc::clone(&folds);
                set.spawn_blocking(move || {
                    let result = run_job(family.as_ref(), &job.params, &folds[job.fold], &dataset);
                    (slot, result)
                });
            }

            let Some(joined) = set.join_next().await else {
                break;
            };
            match joined {
                Ok((slot, Ok(record))) => {
                    tracing::debug!(slot, total, "Job finished");
                    slots[slot] = Some(record);
                }
                Ok((_, Err(e))) => {
                    set.abort_all();
                    return Err(e);
                }
                Err(join_err) => {
                    set.abort_all();
                    return Err(SearchError::training(format!("search job panicked: {join_err}")));
                }
            }
        }

        let mut table = ResultTable::new().with_fingerprint(self.fingerprint.clone());
        table.extend(slots.into_iter().flatten());
        tracing::info!(records = table.len(), run_id = %table.run_id, "Search complete");
        Ok(table)
    }

    fn combinations_per_family(&self) -> Vec<usize> {
        self.families.iter().map(|f| f.grid.len()).collect()
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn neural_family(name: &str, architecture: Architecture, seed: u64, learning_rate: f64) -> Arc<dyn ModelFamily> {
    NeuralFamily::new(name, architecture, seed)
        .with_learning_rate(learning_rate)
        .into_shared()
}

/// Build, fit, evaluate and predict for one (family, combination, fold).
fn run_job(
    family: &dyn ModelFamily,
    params: &PartitionedParams,
    fold: &Fold,
    dataset: &Dataset,
) -> Result<EvaluationRecord, SearchError> {
    let (train_x, train_y) = dataset.select(&fold.train);
    let (test_x, test_y) = dataset.select(&fold.test);

    let mut model = family.construct(&params.construction, dataset.features().width())?;

    let history = model.fit(&train_x, &train_y, &params.fit)?;
    let (train_loss, train_accuracy) = history.final_epoch().ok_or_else(|| {
        SearchError::training(format!("{}: fit completed no epochs", family.name()))
    })?;
    if !train_loss.is_finite() || !train_accuracy.is_finite() {
        return Err(SearchError::training(format!(
            "{}: non-finite training metrics (loss {train_loss}, accuracy {train_accuracy}) on fold {}",
            family.name(),
            fold.index
        )));
    }

    let evaluation = model.evaluate(&test_x, &test_y)?;
    if !evaluation.is_finite() {
        return Err(SearchError::evaluation(format!(
            "{}: non-finite test metrics (loss {}, accuracy {}) on fold {}",
            family.name(),
            evaluation.loss,
            evaluation.accuracy,
            fold.index
        )));
    }

    let predictions = model.predict(&test_x)?;
    if predictions.len() != test_x.len() {
        return Err(SearchError::evaluation(format!(
            "{}: {} predictions for {} held-out rows",
            family.name(),
            predictions.len(),
            test_x.len()
        )));
    }

    tracing::debug!(
        model = family.name(),
        fold = fold.index,
        train_loss,
        train_accuracy,
        test_loss = evaluation.loss,
        test_accuracy = evaluation.accuracy,
        "Fold evaluated"
    );

    Ok(EvaluationRecord {
        model_name: family.name().to_string(),
        construction_params: params.construction.clone(),
        fit_params: params.fit.clone(),
        fold: fold.index,
        train_loss,
        train_accuracy,
        test_loss: evaluation.loss,
        test_accuracy: evaluation.accuracy,
        test_labels: test_y.as_slice().to_vec(),
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::TrainableModel;
    use crate::data::dataset::{FeatureMatrix, LabelVector};
    use crate::training::metrics::{Evaluation, TrainingHistory};
    use crate::training::params::ParamSet;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Predicts the first feature; reports fixed metrics.
    struct Echo;

    impl TrainableModel for Echo {
        fn fit(&mut self, _: &FeatureMatrix, _: &LabelVector, params: &ParamSet) -> Result<TrainingHistory, SearchError> {
            let epochs = params.positive_int("epochs", 1)?;
            let mut h = TrainingHistory::new();
            for e in 0..epochs {
                h.record_epoch(1.0 / (e + 1) as f64, 0.5);
            }
            Ok(h)
        }

        fn evaluate(&self, _: &FeatureMatrix, _: &LabelVector) -> Result<Evaluation, SearchError> {
            Ok(Evaluation { loss: 0.25, accuracy: 0.75 })
        }

        fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, SearchError> {
            Ok(x.rows().iter().map(|r| r[0]).collect())
        }
    }

    struct EchoFamily {
        name: &'static str,
        built: AtomicUsize,
    }

    impl EchoFamily {
        fn shared(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name, built: AtomicUsize::new(0) })
        }
    }

    impl ModelFamily for EchoFamily {
        fn name(&self) -> &str {
            self.name
        }

        fn construct(&self, _: &ParamSet, _: usize) -> Result<Box<dyn TrainableModel>, SearchError> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Echo))
        }
    }

    /// Fails to fit with NaN loss.
    struct Diverging;

    impl TrainableModel for Diverging {
        fn fit(&mut self, _: &FeatureMatrix, _: &LabelVector, _: &ParamSet) -> Result<TrainingHistory, SearchError> {
            let mut h = TrainingHistory::new();
            h.record_epoch(f64::NAN, 0.5);
            Ok(h)
        }

        fn evaluate(&self, _: &FeatureMatrix, _: &LabelVector) -> Result<Evaluation, SearchError> {
            unreachable!("evaluate after failed fit")
        }

        fn predict(&self, _: &FeatureMatrix) -> Result<Vec<f64>, SearchError> {
            unreachable!("predict after failed fit")
        }
    }

    struct DivergingFamily;

    impl ModelFamily for DivergingFamily {
        fn name(&self) -> &str {
            "diverging"
        }

        fn construct(&self, _: &ParamSet, _: usize) -> Result<Box<dyn TrainableModel>, SearchError> {
            Ok(Box::new(Diverging))
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Fault {
        FitError,
        NanTestLoss,
        ShortPredictions,
    }

    /// Trains normally apart from one injected fault.
    struct Faulty(Fault);

    impl TrainableModel for Faulty {
        fn fit(&mut self, _: &FeatureMatrix, _: &LabelVector, _: &ParamSet) -> Result<TrainingHistory, SearchError> {
            if let Fault::FitError = self.0 {
                return Err(SearchError::training("optimizer state corrupted"));
            }
            let mut h = TrainingHistory::new();
            h.record_epoch(0.5, 0.5);
            Ok(h)
        }

        fn evaluate(&self, _: &FeatureMatrix, _: &LabelVector) -> Result<Evaluation, SearchError> {
            match self.0 {
                Fault::NanTestLoss => Ok(Evaluation { loss: f64::NAN, accuracy: 0.5 }),
                _ => Ok(Evaluation { loss: 0.5, accuracy: 0.5 }),
            }
        }

        fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, SearchError> {
            let n = match self.0 {
                Fault::ShortPredictions => x.len() - 1,
                _ => x.len(),
            };
            Ok(vec![0.5; n])
        }
    }

    struct FaultyFamily(Fault);

    impl ModelFamily for FaultyFamily {
        fn name(&self) -> &str {
            "faulty"
        }

        fn construct(&self, _: &ParamSet, _: usize) -> Result<Box<dyn TrainableModel>, SearchError> {
            Ok(Box::new(Faulty(self.0)))
        }
    }

    fn faulty_engine(fault: Fault) -> SearchEngine {
        SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(EchoFamily::shared("ok"), quick_grid())
            .with_family(Arc::new(FaultyFamily(fault)), quick_grid())
            .with_max_parallel(2)
    }

    fn dataset() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 4) as f64]).collect();
        let labels: Vec<u8> = (0..20).map(|i| u8::from(i % 3 == 0)).collect();
        Dataset::from_rows(rows, labels).unwrap()
    }

    fn quick_grid() -> HyperparamGrid {
        HyperparamGrid::new()
            .with("epochs", vec![json!(1)])
            .with("batch_size", vec![json!(1)])
            .with("verbose", vec![json!(0)])
            .with("kernel_regularizer", vec![json!("l1")])
    }

    fn two_by_two_grid() -> HyperparamGrid {
        HyperparamGrid::new()
            .with("epochs", vec![json!(1), json!(2)])
            .with("batch_size", vec![json!(1)])
            .with("verbose", vec![json!(0)])
            .with("kernel_regularizer", vec![json!("l1"), json!("l2")])
    }

    #[test]
    fn test_one_combination_five_folds() {
        let family = EchoFamily::shared("echo");
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(family.clone(), quick_grid());
        let table = engine.evaluate(&dataset()).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(engine.expected_records(), 5);
        // A fresh model per fold.
        assert_eq!(family.built.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_two_families_forty_records() {
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(EchoFamily::shared("a"), two_by_two_grid())
            .with_family(EchoFamily::shared("b"), two_by_two_grid());
        let table = engine.evaluate(&dataset()).unwrap();
        assert_eq!(table.len(), 40);
        assert_eq!(table.by_model("a").count(), 20);
        assert_eq!(table.groups().len(), 8);
    }

    #[test]
    fn test_record_contents() {
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(EchoFamily::shared("echo"), two_by_two_grid());
        let ds = dataset();
        let table = engine.evaluate(&ds).unwrap();

        let first = &table.records()[0];
        assert_eq!(first.model_name, "echo");
        assert_eq!(first.fold, 0);
        assert_eq!(first.construction_params.get("kernel_regularizer"), Some(&json!("l1")));
        assert_eq!(first.fit_params.get("epochs"), Some(&json!(1)));
        assert_eq!(first.fit_params.len(), 3);
        assert_eq!(first.test_loss, 0.25);
        assert_eq!(first.test_accuracy, 0.75);
        assert_eq!(first.test_labels.len(), first.predictions.len());

        // epochs = 2 records the last epoch's loss, not the best.
        let two_epochs = table
            .iter()
            .find(|r| r.fit_params.get("epochs") == Some(&json!(2)))
            .unwrap();
        assert_eq!(two_epochs.train_loss, 0.5);

        // Every row is held out exactly once per combination.
        let mut held_out: Vec<f64> = table.records()[..5]
            .iter()
            .flat_map(|r| r.predictions.iter().copied())
            .collect();
        held_out.sort_by(f64::total_cmp);
        assert_eq!(held_out, (0..20).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_training_failure_aborts() {
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(EchoFamily::shared("ok"), quick_grid())
            .with_family(Arc::new(DivergingFamily), quick_grid());
        let err = engine.evaluate(&dataset()).unwrap_err();
        assert!(matches!(err, SearchError::Training(_)));
    }

    #[test]
    fn test_empty_value_list_is_configuration_error() {
        let grid = quick_grid().with("batch_size", vec![]);
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(EchoFamily::shared("echo"), grid);
        let err = engine.evaluate(&dataset()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_missing_declared_parameter_fails_before_training() {
        let family = EchoFamily::shared("echo");
        let grid = HyperparamGrid::new().with("epochs", vec![json!(1)]);
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(family.clone(), grid);
        assert!(engine.evaluate(&dataset()).unwrap_err().is_configuration());
        assert_eq!(family.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_too_many_folds_for_minority_class() {
        // 7 positives in 20 rows.
        let engine = SearchEngine::new(ParamSchema::default(), 8)
            .unwrap()
            .with_family(EchoFamily::shared("echo"), quick_grid());
        assert!(engine.evaluate(&dataset()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_no_families() {
        let engine = SearchEngine::new(ParamSchema::default(), 5).unwrap();
        assert!(engine.evaluate(&dataset()).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let engine = SearchEngine::new(ParamSchema::default(), 4)
            .unwrap()
            .with_family(EchoFamily::shared("a"), two_by_two_grid())
            .with_family(EchoFamily::shared("b"), quick_grid())
            .with_max_parallel(3);
        let ds = dataset();
        let seq = engine.evaluate(&ds).unwrap();
        let par = engine.evaluate_parallel(Arc::new(ds)).await.unwrap();
        assert_eq!(seq.records(), par.records());
    }

    #[tokio::test]
    async fn test_parallel_failure_aborts() {
        let engine = SearchEngine::new(ParamSchema::default(), 5)
            .unwrap()
            .with_family(Arc::new(DivergingFamily), quick_grid());
        let err = engine.evaluate_parallel(Arc::new(dataset())).await.unwrap_err();
        assert!(matches!(err, SearchError::Training(_)));
    }

    #[test]
    fn test_fit_error_aborts() {
        let err = faulty_engine(Fault::FitError).evaluate(&dataset()).unwrap_err();
        assert!(matches!(err, SearchError::Training(_)));
        assert!(err.to_string().contains("optimizer state corrupted"));
    }

    #[test]
    fn test_non_finite_test_metrics_abort() {
        let err = faulty_engine(Fault::NanTestLoss).evaluate(&dataset()).unwrap_err();
        assert!(matches!(err, SearchError::Evaluation(_)));
        assert!(err.to_string().contains("non-finite test metrics"));
    }

    #[test]
    fn test_prediction_count_mismatch_aborts() {
        let err = faulty_engine(Fault::ShortPredictions).evaluate(&dataset()).unwrap_err();
        assert!(matches!(err, SearchError::Evaluation(_)));
        assert!(err.to_string().contains("predictions for"));
    }

    #[tokio::test]
    async fn test_parallel_aborts_with_each_fault() {
        let cases = [
            (Fault::FitError, "Training failure"),
            (Fault::NanTestLoss, "Evaluation failure"),
            (Fault::ShortPredictions, "Evaluation failure"),
        ];
        for (fault, prefix) in cases {
            let err = faulty_engine(fault)
                .evaluate_parallel(Arc::new(dataset()))
                .await
                .unwrap_err();
            assert!(err.to_string().starts_with(prefix), "{fault:?}: {err}");
        }
    }
}
