//! Configuration for a model-selection search.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment -> overrides.
//! Configuration is loaded from `~/.config/banknote/config.toml` and/or
//! `.banknote/config.toml` in the workspace directory.

use crate::algorithms::Architecture;
use crate::algorithms::neural::DEFAULT_LEARNING_RATE;
use crate::error::SearchError;
use crate::training::folds::DEFAULT_FOLDS;
use crate::training::grid::HyperparamGrid;
use crate::training::partition::ParamSchema;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Schema version of [`SearchConfig`]. Bump when fields change meaning.
pub const CONFIG_VERSION: u32 = 1;

/// Everything that defines one search: folds, parameter roles, model
/// families and their grids, data preparation, reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Number of stratified folds.
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// Seed for model weight initialisation and batch shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Run jobs concurrently on the blocking pool.
    #[serde(default)]
    pub parallel: bool,
    /// Concurrent job limit when `parallel` is set.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Which grid names are construction-time and which are fit-time.
    #[serde(default)]
    pub params: ParamSchema,
    #[serde(default = "default_families")]
    pub families: Vec<FamilyConfig>,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            folds: DEFAULT_FOLDS,
            seed: default_seed(),
            parallel: false,
            max_parallel: default_max_parallel(),
            params: ParamSchema::default(),
            families: default_families(),
            data: DataConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_folds() -> usize {
    DEFAULT_FOLDS
}

fn default_seed() -> u64 {
    42
}

fn default_max_parallel() -> usize {
    4
}

/// The quick grid: one epoch, batch size one, silent, L1 penalty.
pub fn quick_grid() -> HyperparamGrid {
    use serde_json::json;
    HyperparamGrid::new()
        .with("epochs", vec![json!(1)])
        .with("batch_size", vec![json!(1)])
        .with("verbose", vec![json!(0)])
        .with("kernel_regularizer", vec![json!("l1")])
}

fn default_families() -> Vec<FamilyConfig> {
    vec![
        FamilyConfig::new("simple_model", Architecture::Simple, quick_grid()),
        FamilyConfig::new("complex_model", Architecture::Hidden, quick_grid()),
    ]
}

/// One model family and the grid it is searched over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub name: String,
    pub architecture: Architecture,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub grid: HyperparamGrid,
}

impl FamilyConfig {
    pub fn new(name: impl Into<String>, architecture: Architecture, grid: HyperparamGrid) -> Self {
        Self {
            name: name.into(),
            architecture,
            learning_rate: DEFAULT_LEARNING_RATE,
            grid,
        }
    }
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

/// Dataset preparation switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Name of the label column in the input CSV.
    #[serde(default = "default_label_column")]
    pub label_column: String,
    /// Drop rows with duplicate feature vectors, keeping the first.
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    /// Z-score every feature column.
    #[serde(default = "default_true")]
    pub standardize: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            label_column: default_label_column(),
            deduplicate: true,
            standardize: true,
        }
    }
}

fn default_label_column() -> String {
    crate::data::source::DEFAULT_LABEL_COLUMN.to_string()
}

fn default_true() -> bool {
    true
}

/// Console report options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// How many raw records to list, best test loss first.
    #[serde(default = "default_top_records")]
    pub top_records: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_records: default_top_records(),
        }
    }
}

fn default_top_records() -> usize {
    10
}

impl SearchConfig {
    /// Check the configuration as a whole, before any data is touched.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.version != CONFIG_VERSION {
            return Err(SearchError::configuration(format!(
                "config version {} is not supported (expected {CONFIG_VERSION})",
                self.version
            )));
        }
        if self.folds < 2 {
            return Err(SearchError::configuration(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.families.is_empty() {
            return Err(SearchError::configuration("no model families configured"));
        }
        self.params.validate()?;

        let mut names = BTreeSet::new();
        for family in &self.families {
            if !names.insert(family.name.as_str()) {
                return Err(SearchError::configuration(format!(
                    "model family '{}' is configured twice",
                    family.name
                )));
            }
            if !(family.learning_rate.is_finite() && family.learning_rate > 0.0) {
                return Err(SearchError::configuration(format!(
                    "learning rate for '{}' must be positive",
                    family.name
                )));
            }
            self.params.validate_grid(&family.name, &family.grid)?;
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON form. Identical searches share a
    /// fingerprint.
    pub fn fingerprint(&self) -> Result<String, SearchError> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Render as TOML, e.g. for `config show`.
    pub fn to_toml(&self) -> Result<String, SearchError> {
        toml::to_string_pretty(self).map_err(|e| SearchError::configuration(e.to_string()))
    }
}

/// Per-user configuration file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "banknote", "banknote")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Workspace-local configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".banknote").join("config.toml")
}

/// Prefix of the environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "BANKNOTE_";

/// The files and environment a configuration is layered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub user: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub explicit: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

impl ConfigSources {
    /// The per-user file and `BANKNOTE_*` variables, plus the given workspace
    /// and explicit file.
    pub fn standard(workspace: Option<&Path>, explicit: Option<&Path>) -> Self {
        Self {
            user: user_config_path(),
            env_prefix: Some(ENV_PREFIX.to_string()),
            ..Self::isolated(workspace, explicit)
        }
    }

    /// Only the given workspace and explicit file; no user file, no
    /// environment.
    pub fn isolated(workspace: Option<&Path>, explicit: Option<&Path>) -> Self {
        Self {
            user: None,
            workspace: workspace.map(Path::to_path_buf),
            explicit: explicit.map(Path::to_path_buf),
            env_prefix: None,
        }
    }

    /// Merge the sources over the defaults, then apply `overrides`.
    ///
    /// Priority (highest to lowest):
    /// 1. Explicit overrides (passed as argument)
    /// 2. Environment variables (prefixed with `env_prefix`)
    /// 3. Explicit config file (`--config`)
    /// 4. Workspace-local config (`.banknote/config.toml`)
    /// 5. User config (`~/.config/banknote/config.toml`)
    /// 6. Built-in defaults
    pub fn load(&self, overrides: Option<&serde_json::Value>) -> Result<SearchConfig, SearchError> {
        let mut figment = Figment::from(Serialized::defaults(SearchConfig::default()));

        if let Some(user_config) = &self.user {
            if user_config.exists() {
                figment = figment.merge(Toml::file(user_config));
            }
        }

        if let Some(ws) = &self.workspace {
            let ws_config = workspace_config_path(ws);
            if ws_config.exists() {
                figment = figment.merge(Toml::file(&ws_config));
            }
        }

        if let Some(path) = &self.explicit {
            if !path.exists() {
                return Err(SearchError::configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        // BANKNOTE_FOLDS, BANKNOTE_DATA__STANDARDIZE, etc.
        if let Some(prefix) = &self.env_prefix {
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: SearchConfig = figment.extract().map_err(Box::new)?;
        tracing::debug!(
            version = config.version,
            folds = config.folds,
            families = config.families.len(),
            "Loaded search configuration"
        );
        Ok(config)
    }
}

/// Load configuration from the standard layered sources.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
    overrides: Option<&serde_json::Value>,
) -> Result<SearchConfig, SearchError> {
    ConfigSources::standard(workspace, explicit).load(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = SearchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.folds, 5);
        assert_eq!(config.families.len(), 2);
        assert_eq!(config.families[0].grid.len(), 1);
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = SearchConfig::default();
        let b = SearchConfig::default();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let mut c = SearchConfig::default();
        c.folds = 3;
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_folds() {
        let mut config = SearchConfig::default();
        config.families[1].name = config.families[0].name.clone();
        assert!(config.validate().unwrap_err().is_configuration());

        let config = SearchConfig {
            folds: 1,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SearchConfig {
            version: 99,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SearchConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: SearchConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.toml");
        std::fs::write(
            &path,
            r#"
folds = 3

[data]
standardize = false

[[families]]
name = "wide"
architecture = "hidden"

[families.grid]
epochs = [5, 10]
batch_size = [3, 4]
verbose = [0]
kernel_regularizer = ["l1", "l2"]
"#,
        )
        .unwrap();

        let config = load_config(None, Some(&path), None).unwrap();
        assert_eq!(config.folds, 3);
        assert!(!config.data.standardize);
        assert!(config.data.deduplicate);
        assert_eq!(config.families.len(), 1);
        assert_eq!(config.families[0].architecture, Architecture::Hidden);
        assert_eq!(config.families[0].grid.len(), 8);
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_win() {
        let overrides = serde_json::json!({ "folds": 4, "parallel": true });
        let config = load_config(None, None, Some(&overrides)).unwrap();
        assert_eq!(config.folds, 4);
        assert!(config.parallel);
    }

    #[test]
    fn test_isolated_sources_skip_user_and_env() {
        let sources = ConfigSources::isolated(None, None);
        assert_eq!(sources.user, None);
        assert_eq!(sources.env_prefix, None);
        assert_eq!(sources.load(None).unwrap(), SearchConfig::default());

        let standard = ConfigSources::standard(None, None);
        assert_eq!(standard.env_prefix.as_deref(), Some(ENV_PREFIX));
    }

    #[test]
    fn test_user_file_sits_below_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        std::fs::write(&user, "folds = 7\nseed = 3\n").unwrap();
        let ws_config = workspace_config_path(dir.path());
        std::fs::create_dir_all(ws_config.parent().unwrap()).unwrap();
        std::fs::write(&ws_config, "folds = 4\n").unwrap();

        let sources = ConfigSources {
            user: Some(user),
            ..ConfigSources::isolated(Some(dir.path()), None)
        };
        let config = sources.load(None).unwrap();
        assert_eq!(config.folds, 4);
        assert_eq!(config.seed, 3);
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = load_config(None, Some(Path::new("/nonexistent/banknote.toml")), None).unwrap_err();
        assert!(err.is_configuration());
    }
}
