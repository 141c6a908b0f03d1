//! Splitting a combination into construction-time and fit-time parameters.

use crate::error::SearchError;
use crate::training::grid::HyperparamGrid;
use crate::training::params::{ParamCombination, ParamSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which parameter names configure model construction and which configure
/// training. Fixed for a whole search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSchema {
    pub construction: BTreeSet<String>,
    pub fit: BTreeSet<String>,
}

impl Default for ParamSchema {
    fn default() -> Self {
        Self {
            construction: ["kernel_regularizer".to_string()].into(),
            fit: [
                "epochs".to_string(),
                "verbose".to_string(),
                "batch_size".to_string(),
            ]
            .into(),
        }
    }
}

/// The two halves of one combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedParams {
    pub construction: ParamSet,
    pub fit: ParamSet,
}

impl ParamSchema {
    pub fn new<C, F>(construction: C, fit: F) -> Result<Self, SearchError>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let schema = Self {
            construction: construction.into_iter().map(Into::into).collect(),
            fit: fit.into_iter().map(Into::into).collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// The construction and fit name sets must not share a name.
    pub fn validate(&self) -> Result<(), SearchError> {
        let shared: Vec<&str> = self
            .construction
            .intersection(&self.fit)
            .map(String::as_str)
            .collect();
        if !shared.is_empty() {
            return Err(SearchError::configuration(format!(
                "parameters declared as both construction and fit: {}",
                shared.join(", ")
            )));
        }
        Ok(())
    }

    /// Check once, before any training, that `grid` supplies every declared
    /// name. Combinations of a checked grid always partition cleanly.
    pub fn validate_grid(&self, family: &str, grid: &HyperparamGrid) -> Result<(), SearchError> {
        let missing: Vec<&str> = self
            .construction
            .iter()
            .chain(&self.fit)
            .filter(|name| !grid.contains(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(SearchError::configuration(format!(
                "grid for '{family}' is missing declared parameters: {}",
                missing.join(", ")
            )));
        }

        let ignored: Vec<&str> = grid
            .names()
            .filter(|n| !self.construction.contains(*n) && !self.fit.contains(*n))
            .collect();
        if !ignored.is_empty() {
            tracing::warn!(
                family,
                ignored = %ignored.join(", "),
                "Grid parameters are neither construction nor fit parameters and will be ignored"
            );
        }
        Ok(())
    }

    /// Split `combo` into its construction and fit halves.
    pub fn partition(&self, combo: &ParamCombination) -> Result<PartitionedParams, SearchError> {
        Ok(PartitionedParams {
            construction: Self::pick(&self.construction, combo)?,
            fit: Self::pick(&self.fit, combo)?,
        })
    }

    fn pick(names: &BTreeSet<String>, combo: &ParamCombination) -> Result<ParamSet, SearchError> {
        let pairs = names
            .iter()
            .map(|name| {
                combo
                    .get(name)
                    .map(|v| (name.clone(), v.clone()))
                    .ok_or_else(|| {
                        SearchError::configuration(format!(
                            "parameter '{name}' is declared but absent from the combination"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParamSet::from_pairs(pairs))
    }
}
