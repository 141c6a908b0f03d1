//! Hyperparameter grid expansion.

use crate::training::params::{ParamCombination, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Candidate values per parameter name for one model family.
///
/// Keys are kept sorted, so expansion order depends only on the grid's
/// contents and never on how it was written down.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl HyperparamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the candidate list for `name`.
    pub fn with(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.params.insert(name.into(), values);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.params.get(name).map(Vec::as_slice)
    }

    /// Names whose candidate list is empty. Any such name makes the whole
    /// grid expand to nothing.
    pub fn empty_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Number of combinations, without expanding them.
    pub fn len(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the Cartesian product, lexicographic by key with the last key
    /// varying fastest. Each call starts from the beginning.
    pub fn iter(&self) -> GridIter<'_> {
        let lists: Vec<(&String, &Vec<ParamValue>)> = self.params.iter().collect();
        let remaining = self.len();
        GridIter {
            cursor: vec![0; lists.len()],
            lists,
            remaining,
        }
    }
}

impl FromIterator<(String, Vec<ParamValue>)> for HyperparamGrid {
    fn from_iter<I: IntoIterator<Item = (String, Vec<ParamValue>)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a HyperparamGrid {
    type Item = ParamCombination;
    type IntoIter = GridIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy odometer over a [`HyperparamGrid`].
#[derive(Debug, Clone)]
pub struct GridIter<'a> {
    lists: Vec<(&'a String, &'a Vec<ParamValue>)>,
    cursor: Vec<usize>,
    remaining: usize,
}

impl Iterator for GridIter<'_> {
    type Item = ParamCombination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let combo = self
            .lists
            .iter()
            .zip(&self.cursor)
            .map(|((name, values), &i)| (name.to_string(), values[i].clone()))
            .collect();

        self.remaining -= 1;
        for pos in (0..self.cursor.len()).rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < self.lists[pos].1.len() {
                break;
            }
            self.cursor[pos] = 0;
        }

        Some(combo)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for GridIter<'_> {}
