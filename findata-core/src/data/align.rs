//! Outer-join alignment of labeled series.
//!
//! Given several series keyed by date (or by any ordered key, such as a
//! country/year pair), align them to the union of their keys. A series with
//! no observation at a key gets a null cell there. Values are never filled.

use std::collections::{BTreeMap, BTreeSet};

/// One named column of observations before alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSeries<K> {
    pub label: String,
    /// Observations by key. A `None` value is a reported-but-missing value;
    /// its key still takes part in the shared index.
    pub points: BTreeMap<K, Option<f64>>,
}

impl<K: Ord> LabeledSeries<K> {
    pub fn new(label: impl Into<String>, points: BTreeMap<K, Option<f64>>) -> Self {
        Self {
            label: label.into(),
            points,
        }
    }

    /// A series with no observations. Aligns to an all-null column.
    pub fn empty(label: impl Into<String>) -> Self {
        Self::new(label, BTreeMap::new())
    }
}

/// Series aligned to a common, ascending key axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned<K> {
    /// The common key axis (sorted ascending, no duplicates).
    pub keys: Vec<K>,
    /// Columns in input order. Each has the same length as `keys`.
    pub columns: Vec<(String, Vec<Option<f64>>)>,
}

impl<K> Aligned<K> {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The first column label that occurs more than once, if any.
    pub fn duplicate_label(&self) -> Option<&str> {
        let mut seen = BTreeSet::new();
        self.columns
            .iter()
            .map(|(label, _)| label.as_str())
            .find(|label| !seen.insert(*label))
    }
}

/// Align series to the union of their keys.
///
/// Column order follows the input order, which is the order callers asked
/// for their series in.
pub fn align_series<K: Ord + Clone>(series: Vec<LabeledSeries<K>>) -> Aligned<K> {
    let all_keys: BTreeSet<K> = series
        .iter()
        .flat_map(|s| s.points.keys().cloned())
        .collect();
    let keys: Vec<K> = all_keys.into_iter().collect();

    let columns = series
        .into_iter()
        .map(|s| {
            let values = keys
                .iter()
                .map(|k| s.points.get(k).copied().flatten())
                .collect();
            (s.label, values)
        })
        .collect();

    Aligned { keys, columns }
}
