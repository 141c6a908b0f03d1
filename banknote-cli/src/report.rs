//! Console tables and JSON export for finished searches.

use banknote_core::training::{AggregatedSummary, EvaluationRecord, GroupSummary, ResultTable};
use banknote_core::{FeatureMatrix, LabelVector};
use serde::Serialize;
use std::fmt::Write as _;

/// Everything `--output` writes.
#[derive(Debug, Serialize)]
pub struct SearchExport<'a> {
    pub table: &'a ResultTable,
    pub summary: &'a AggregatedSummary,
}

/// Raw records, already ranked, best first.
pub fn records_table(ranked: &[&EvaluationRecord], top: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>10}  {:>14}  {:>10}  {:>13}  {:<16}  params",
        "train_loss", "train_accuracy", "test_loss", "test_accuracy", "model_name"
    );
    for record in ranked.iter().take(top) {
        let _ = writeln!(
            out,
            "{:>10.4}  {:>14.4}  {:>10.4}  {:>13.4}  {:<16}  {} {} fold={}",
            record.train_loss,
            record.train_accuracy,
            record.test_loss,
            record.test_accuracy,
            record.model_name,
            record.construction_params,
            record.fit_params,
            record.fold
        );
    }
    if ranked.len() > top {
        let _ = writeln!(out, "... {} more records", ranked.len() - top);
    }
    out
}

/// Cross-validated accuracy per configuration, already ranked.
pub fn summary_table(ranked: &[&GroupSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16}  {:>5}  {:>13}  {:>12}  {:>14}  params",
        "model_name", "folds", "mean_accuracy", "std_accuracy", "mean_test_loss"
    );
    for row in ranked {
        let _ = writeln!(
            out,
            "{:<16}  {:>5}  {:>13.4}  {:>12.4}  {:>14.4}  {} {}",
            row.model_name,
            row.folds,
            row.test_accuracy.mean,
            row.test_accuracy.std,
            row.test_loss.mean,
            row.construction_params,
            row.fit_params
        );
    }
    out
}

/// Row count, class balance and per-class feature means.
pub fn inspect_table(
    names: &[String],
    labels: &LabelVector,
    negatives: &FeatureMatrix,
    positives: &FeatureMatrix,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "rows: {}", labels.len());
    for (label, count) in labels.class_counts() {
        let _ = writeln!(out, "class {label}: {count}");
    }
    let _ = writeln!(out, "positive rate: {:.4}", labels.positive_rate());
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<16}  {:>12}  {:>12}", "feature", "mean[0]", "mean[1]");
    for (j, name) in names.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<16}  {:>12.4}  {:>12.4}",
            name,
            column_mean(negatives, j),
            column_mean(positives, j)
        );
    }
    out
}

fn column_mean(matrix: &FeatureMatrix, j: usize) -> f64 {
    if matrix.is_empty() {
        return f64::NAN;
    }
    matrix.column(j).iter().sum::<f64>() / matrix.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use banknote_core::training::{ParamSet, aggregate, rank_groups, rank_records};
    use serde_json::json;

    fn record(reg: &str, fold: usize, test_loss: f64, test_accuracy: f64) -> EvaluationRecord {
        EvaluationRecord {
            model_name: "simple_model".to_string(),
            construction_params: ParamSet::from_pairs([("kernel_regularizer".to_string(), json!(reg))]),
            fit_params: ParamSet::from_pairs([("epochs".to_string(), json!(1))]),
            fold,
            train_loss: 0.6,
            train_accuracy: 0.7,
            test_loss,
            test_accuracy,
            test_labels: vec![0, 1],
            predictions: vec![0.2, 0.8],
        }
    }

    fn table() -> ResultTable {
        let mut table = ResultTable::new();
        table.push(record("l1", 0, 0.40, 0.80));
        table.push(record("l1", 1, 0.20, 0.90));
        table.push(record("l2", 0, 0.30, 0.95));
        table.push(record("l2", 1, 0.35, 0.85));
        table
    }

    #[test]
    fn test_records_table_truncates() {
        let table = table();
        let ranked = rank_records(&table);
        let text = records_table(&ranked, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("test_accuracy"));
        assert!(lines[1].contains("0.2000"));
        assert!(lines[3].contains("2 more records"));
    }

    #[test]
    fn test_summary_table_orders_by_accuracy() {
        let table = table();
        let summary = aggregate(&table);
        let ranked = rank_groups(&summary);
        let text = summary_table(&ranked);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("\"l2\""));
        assert!(lines[1].contains("0.9000"));
    }

    #[test]
    fn test_export_serializes_both_parts() {
        let table = table();
        let summary = aggregate(&table);
        let export = SearchExport { table: &table, summary: &summary };
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["table"]["records"].as_array().unwrap().len(), 4);
        assert_eq!(value["summary"]["rows"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_inspect_table() {
        let names = vec!["variance".to_string(), "skewness".to_string()];
        let labels = LabelVector::new(vec![0, 1, 1]).unwrap();
        let neg = FeatureMatrix::new(vec![vec![1.0, 2.0]]).unwrap();
        let pos = FeatureMatrix::new(vec![vec![3.0, 0.0], vec![5.0, 2.0]]).unwrap();
        let text = inspect_table(&names, &labels, &neg, &pos);
        assert!(text.contains("rows: 3"));
        assert!(text.contains("class 1: 2"));
        assert!(text.lines().any(|l| l.starts_with("variance") && l.contains("4.0000")));
    }
}
