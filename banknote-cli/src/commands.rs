//! CLI subcommand handlers.

use crate::report::{self, SearchExport};
use crate::{Commands, ConfigAction};
use anyhow::Context;
use banknote_core::config::{ConfigSources, SearchConfig, workspace_config_path};
use banknote_core::data::{CsvSource, Dataset, prepare};
use banknote_core::data::transform::partition_by_label;
use banknote_core::training::{ResultTable, SearchEngine, aggregate, rank_groups, rank_records};
use banknote_core::RocCurve;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let sources = ConfigSources::standard(Some(workspace), config_path);
    match command {
        Commands::Search {
            input,
            folds,
            parallel,
            output,
            roc_out,
            top,
        } => {
            let options = SearchOptions {
                input,
                folds,
                parallel,
                output,
                roc_out,
                top,
            };
            handle_search(options, &sources).await
        }
        Commands::Inspect { input } => handle_inspect(&input, &sources),
        Commands::Config { action } => handle_config(action, workspace, &sources),
    }
}

#[derive(Debug)]
struct SearchOptions {
    input: PathBuf,
    folds: Option<usize>,
    parallel: bool,
    output: Option<PathBuf>,
    roc_out: Option<PathBuf>,
    top: Option<usize>,
}

impl SearchOptions {
    /// Command-line flags as a figment override layer.
    fn overrides(&self) -> serde_json::Value {
        let mut overrides = serde_json::Map::new();
        if let Some(folds) = self.folds {
            overrides.insert("folds".into(), folds.into());
        }
        if self.parallel {
            overrides.insert("parallel".into(), true.into());
        }
        if let Some(top) = self.top {
            overrides.insert("report".into(), serde_json::json!({ "top_records": top }));
        }
        serde_json::Value::Object(overrides)
    }
}

fn load(sources: &ConfigSources, overrides: Option<&serde_json::Value>) -> anyhow::Result<SearchConfig> {
    sources
        .load(overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn load_dataset(input: &Path, config: &SearchConfig) -> anyhow::Result<Dataset> {
    let dataset = CsvSource::new(input)
        .with_label_column(config.data.label_column.clone())
        .load()
        .with_context(|| format!("Failed to load dataset from {}", input.display()))?;
    prepare(dataset, &config.data).context("Failed to prepare dataset")
}

async fn handle_search(
    options: SearchOptions,
    sources: &ConfigSources,
) -> anyhow::Result<()> {
    let overrides = options.overrides();
    let config = load(sources, Some(&overrides))?;
    let engine = SearchEngine::from_config(&config).context("Invalid search configuration")?;
    let dataset = load_dataset(&options.input, &config)?;

    tracing::info!(
        families = engine.families().len(),
        folds = engine.n_folds(),
        expected_records = engine.expected_records(),
        parallel = config.parallel,
        "Starting search"
    );

    let table = run_search(engine, dataset, config.parallel).await?;
    let summary = aggregate(&table);

    let ranked_records = rank_records(&table);
    println!("Best records by test loss:");
    print!("{}", report::records_table(&ranked_records, config.report.top_records));
    println!();

    let ranked_groups = rank_groups(&summary);
    println!("Cross-validated accuracy:");
    print!("{}", report::summary_table(&ranked_groups));

    if let Some(best) = ranked_groups.first() {
        let key = best.key();
        match RocCurve::pooled(table.group(&key)) {
            Ok(roc) => {
                println!();
                println!(
                    "ROC AUC of best configuration ({} {} {}): {:.4}",
                    best.model_name, best.construction_params, best.fit_params, roc.auc
                );
                if let Some(path) = &options.roc_out {
                    write_json(path, &roc)?;
                    println!("ROC points written to {}", path.display());
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not compute ROC curve"),
        }
    }

    if let Some(path) = &options.output {
        write_json(path, &SearchExport { table: &table, summary: &summary })?;
        println!("Results written to {}", path.display());
    }
    Ok(())
}

async fn run_search(engine: SearchEngine, dataset: Dataset, parallel: bool) -> anyhow::Result<ResultTable> {
    let table = if parallel {
        engine.evaluate_parallel(Arc::new(dataset)).await?
    } else {
        tokio::task::spawn_blocking(move || engine.evaluate(&dataset))
            .await
            .context("Search task panicked")??
    };
    Ok(table)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn handle_inspect(input: &Path, sources: &ConfigSources) -> anyhow::Result<()> {
    let config = load(sources, None)?;
    let dataset = load_dataset(input, &config)?;
    let (negatives, positives) = partition_by_label(&dataset);
    print!(
        "{}",
        report::inspect_table(dataset.feature_names(), dataset.labels(), &negatives, &positives)
    );
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path, sources: &ConfigSources) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = workspace_config_path(workspace);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&SearchConfig::default())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(sources, None)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            println!("# fingerprint: {}", config.fingerprint()?);
            Ok(())
        }
    }
}
