//! Hyperparameter values, combinations, and canonical parameter sets.

use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value. Grids are written in TOML/JSON, so values
/// keep their JSON shape.
pub type ParamValue = serde_json::Value;

/// One concrete assignment of a value to every name in a grid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamCombination(BTreeMap<String, ParamValue>);

impl ParamCombination {
    pub fn new(values: BTreeMap<String, ParamValue>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, ParamValue)> for ParamCombination {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered tuple of name/value pairs, sorted by name.
///
/// Used as the construction and fit halves of a combination and as part of
/// the grouping key for aggregation, so two sets built from the same pairs in
/// any order compare equal. Equality and ordering both compare the compact
/// JSON text of each value, so `-0.0` and `0.0` are distinct parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(String, ParamValue)>", into = "Vec<(String, ParamValue)>")]
pub struct ParamSet(Vec<(String, ParamValue)>);

impl ParamSet {
    /// Canonicalize arbitrary pairs. Later duplicates of a name win.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, ParamValue)>) -> Self {
        let map: BTreeMap<String, ParamValue> = pairs.into_iter().collect();
        Self(map.into_iter().collect())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .map(|i| &self.0[i].1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Read a positive integer, falling back to `default` when absent.
    pub fn positive_int(&self, name: &str, default: u64) -> Result<u64, SearchError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_u64().filter(|n| *n >= 1).ok_or_else(|| {
                SearchError::configuration(format!(
                    "parameter '{name}' must be a positive integer, got {v}"
                ))
            }),
        }
    }

    /// Read a non-negative integer, falling back to `default` when absent.
    pub fn non_negative_int(&self, name: &str, default: u64) -> Result<u64, SearchError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| {
                SearchError::configuration(format!(
                    "parameter '{name}' must be a non-negative integer, got {v}"
                ))
            }),
        }
    }

    /// Read an optional string; JSON `null` counts as absent.
    pub fn optional_str(&self, name: &str) -> Result<Option<&str>, SearchError> {
        match self.get(name) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::String(s)) => Ok(Some(s.as_str())),
            Some(v) => Err(SearchError::configuration(format!(
                "parameter '{name}' must be a string, got {v}"
            ))),
        }
    }
}

impl From<Vec<(String, ParamValue)>> for ParamSet {
    fn from(pairs: Vec<(String, ParamValue)>) -> Self {
        Self::from_pairs(pairs)
    }
}

impl From<ParamSet> for Vec<(String, ParamValue)> {
    fn from(set: ParamSet) -> Self {
        set.0
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, ")")
    }
}

impl PartialEq for ParamSet {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ParamSet {}

impl PartialOrd for ParamSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// serde_json::Value has no total order; compact JSON text stands in for it.
impl Ord for ParamSet {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.0.iter().map(|(k, v)| (k, v.to_string()));
        let rhs = other.0.iter().map(|(k, v)| (k, v.to_string()));
        lhs.cmp(rhs)
    }
}
