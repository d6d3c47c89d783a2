//! Gap resolution: what remains to be done.

use crate::item::WorkKey;
use std::collections::BTreeSet;
use std::fmt;

/// Keys present in the catalog but not completed, ascending, deduplicated.
pub fn resolve<I>(catalog_keys: I, completed: &BTreeSet<WorkKey>) -> Vec<WorkKey>
where
    I: IntoIterator<Item = WorkKey>,
{
    catalog_keys
        .into_iter()
        .filter(|key| !completed.contains(key))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Compress keys into readable ranges, e.g. `"12-15, 20, 33-40"`.
pub fn compress_ranges(keys: &[WorkKey]) -> String {
    let sorted: BTreeSet<u64> = keys.iter().map(|k| k.get()).collect();
    let mut iter = sorted.into_iter();

    let Some(first) = iter.next() else {
        return "none".to_string();
    };

    let mut ranges = Vec::new();
    let (mut start, mut end) = (first, first);

    for value in iter {
        if value == end + 1 {
            end = value;
        } else {
            ranges.push(format_range(start, end));
            start = value;
            end = value;
        }
    }
    ranges.push(format_range(start, end));

    ranges.join(", ")
}

fn format_range(start: u64, end: u64) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

/// Catalog-vs-ledger comparison shown to the operator before a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapReport {
    pub total: usize,
    pub completed: usize,
    pub missing: Vec<WorkKey>,
}

impl GapReport {
    pub fn new<I>(catalog_keys: I, completed: &BTreeSet<WorkKey>) -> Self
    where
        I: IntoIterator<Item = WorkKey>,
    {
        let catalog: BTreeSet<WorkKey> = catalog_keys.into_iter().collect();
        let missing = resolve(catalog.iter().copied(), completed);

        Self {
            total: catalog.len(),
            completed: catalog.len() - missing.len(),
            missing,
        }
    }

    pub fn completion_pct(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn missing_ranges(&self) -> String {
        compress_ranges(&self.missing)
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl fmt::Display for GapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} complete ({:.1}%), {} missing",
            self.completed,
            self.total,
            self.completion_pct(),
            self.missing.len()
        )
    }
}
