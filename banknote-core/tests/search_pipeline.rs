//! End-to-end search integration tests.
//!
//! These run the full pipeline (CSV parsing, preparation, stratified folds,
//! the reference networks, aggregation and ranking) over a small synthetic
//! banknote-like table.

use banknote_core::algorithms::{Architecture, NeuralFamily};
use banknote_core::config::{DataConfig, SearchConfig, load_config};
use banknote_core::data::source::parse_csv;
use banknote_core::data::{Dataset, prepare};
use banknote_core::training::{HyperparamGrid, ParamSchema, SearchEngine, aggregate, rank_groups, rank_records};
use banknote_core::{RocCurve, SearchError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

/// Two noisy clusters on four features, 60 rows, 24 positives.
fn synthetic_csv() -> String {
    let mut csv = String::from("variance,skewness,curtosis,entropy,class\n");
    for i in 0..60 {
        let label = u8::from(i % 5 < 2);
        let centre = if label == 1 { -1.5 } else { 1.5 };
        let jitter = ((i * 37) % 11) as f64 / 10.0 - 0.5;
        csv.push_str(&format!(
            "{},{},{},{},{label}\n",
            centre + jitter,
            centre * 2.0 - jitter,
            jitter * 3.0,
            -0.2 * i as f64 / 60.0
        ));
    }
    csv
}

fn dataset() -> Dataset {
    let raw = parse_csv(&synthetic_csv(), ',', "class").unwrap();
    prepare(raw, &DataConfig::default()).unwrap()
}

fn grid(epochs: &[u64], regs: &[&str]) -> HyperparamGrid {
    HyperparamGrid::new()
        .with("epochs", epochs.iter().map(|e| json!(e)).collect())
        .with("batch_size", vec![json!(4)])
        .with("verbose", vec![json!(0)])
        .with("kernel_regularizer", regs.iter().map(|r| json!(r)).collect())
}

fn engine(folds: usize) -> SearchEngine {
    SearchEngine::new(ParamSchema::default(), folds)
        .unwrap()
        .with_family(
            NeuralFamily::new("simple_model", Architecture::Simple, 42).into_shared(),
            grid(&[5, 20], &["l1", "l2"]),
        )
        .with_family(
            NeuralFamily::new("complex_model", Architecture::Hidden, 42).into_shared(),
            grid(&[5, 20], &["l1", "l2"]),
        )
}

#[test]
fn test_default_config_search_emits_one_record_per_fold() {
    let config = SearchConfig::default();
    let engine = SearchEngine::from_config(&config).unwrap();
    let table = engine.evaluate(&dataset()).unwrap();

    assert_eq!(table.len(), 10);
    assert_eq!(table.by_model("simple_model").count(), 5);
    assert_eq!(table.config_fingerprint, Some(config.fingerprint().unwrap()));
    for record in &table {
        assert!(record.test_loss.is_finite());
        assert!((0.0..=1.0).contains(&record.test_accuracy));
        assert_eq!(record.test_labels.len(), record.predictions.len());
    }
}

#[test]
fn test_full_grid_forty_records_and_summary() {
    let table = engine(5).evaluate(&dataset()).unwrap();
    assert_eq!(table.len(), 40);

    let summary = aggregate(&table);
    assert_eq!(summary.len(), 8);
    assert!(summary.rows().iter().all(|row| row.folds == 5));

    let ranked = rank_groups(&summary);
    for pair in ranked.windows(2) {
        assert!(pair[0].test_accuracy.mean >= pair[1].test_accuracy.mean);
    }

    let records = rank_records(&table);
    assert_eq!(records.len(), 40);
    assert!(records[0].test_loss <= records[39].test_loss);
}

#[test]
fn test_separable_data_is_learned() {
    let engine = SearchEngine::new(ParamSchema::default(), 5)
        .unwrap()
        .with_family(
            NeuralFamily::new("simple_model", Architecture::Simple, 42)
                .with_learning_rate(0.1)
                .into_shared(),
            grid(&[50], &["l2", "none"]),
        );
    let table = engine.evaluate(&dataset()).unwrap();
    let summary = aggregate(&table);
    let best = rank_groups(&summary)[0];
    assert!(
        best.test_accuracy.mean > 0.8,
        "best mean accuracy {}",
        best.test_accuracy.mean
    );

    let roc = RocCurve::pooled(table.group(&best.key())).unwrap();
    assert!(roc.auc > 0.8, "auc {}", roc.auc);
}

#[test]
fn test_search_is_reproducible() {
    let ds = dataset();
    let a = engine(3).evaluate(&ds).unwrap();
    let b = engine(3).evaluate(&ds).unwrap();
    assert_eq!(a.records(), b.records());
    assert_ne!(a.run_id, b.run_id);
}

#[tokio::test]
async fn test_parallel_search_matches_sequential() {
    let ds = dataset();
    let seq = engine(4).evaluate(&ds).unwrap();
    let par = engine(4)
        .with_max_parallel(4)
        .evaluate_parallel(Arc::new(ds))
        .await
        .unwrap();
    assert_eq!(seq.records(), par.records());
}

#[test]
fn test_unknown_regularizer_aborts_search() {
    let engine = SearchEngine::new(ParamSchema::default(), 5)
        .unwrap()
        .with_family(
            NeuralFamily::new("simple_model", Architecture::Simple, 1).into_shared(),
            grid(&[1], &["l3"]),
        );
    let err = engine.evaluate(&dataset()).unwrap_err();
    assert!(matches!(err, SearchError::Configuration(_)));
}

#[test]
fn test_config_file_drives_search() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("search.toml");
    std::fs::write(
        &path,
        r#"
folds = 3
seed = 7

[[families]]
name = "tiny"
architecture = "simple"

[families.grid]
epochs = [2]
batch_size = [8]
verbose = [0]
kernel_regularizer = ["l2", "none"]
"#,
    )
    .unwrap();

    let config = load_config(None, Some(&path), None).unwrap();
    let engine = SearchEngine::from_config(&config).unwrap();
    assert_eq!(engine.expected_records(), 6);

    let table = engine.evaluate(&dataset()).unwrap();
    assert_eq!(table.len(), 6);
    assert_eq!(aggregate(&table).len(), 2);
}

#[test]
fn test_results_survive_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    let table = engine(3).evaluate(&dataset()).unwrap();
    table.save(&path).unwrap();

    let loaded = banknote_core::ResultTable::load(&path).unwrap();
    assert_eq!(loaded.run_id, table.run_id);
    assert_eq!(loaded.len(), table.len());
    assert_eq!(aggregate(&loaded).len(), aggregate(&table).len());
}
