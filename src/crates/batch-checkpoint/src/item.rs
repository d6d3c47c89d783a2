//! Work items and their stable external keys.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable external key of a work item (a report id or a row number).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkKey(u64);

impl WorkKey {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for WorkKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a [`WorkKey`] is written to and read back from tabular files.
///
/// Some catalogs key reports by their platform id (`"1042"`), others by a
/// prefixed row number (`"Report_17"`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    #[default]
    Numeric,
    Prefixed(String),
}

impl KeyScheme {
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self::Prefixed(prefix.into())
    }

    pub fn render(&self, key: WorkKey) -> String {
        match self {
            Self::Numeric => key.to_string(),
            Self::Prefixed(prefix) => format!("{}{}", prefix, key),
        }
    }

    pub fn parse(&self, label: &str) -> Result<WorkKey> {
        let label = label.trim();
        let digits = match self {
            Self::Numeric => label,
            Self::Prefixed(prefix) => label
                .strip_prefix(prefix.as_str())
                .ok_or_else(|| CheckpointError::InvalidKey(label.to_string()))?,
        };

        // Spreadsheet exports sometimes turn integer ids into "17.0".
        let digits = digits.strip_suffix(".0").unwrap_or(digits);

        digits
            .parse::<u64>()
            .map(WorkKey)
            .map_err(|_| CheckpointError::InvalidKey(label.to_string()))
    }
}

/// One unit of external-processing work. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem<P> {
    pub key: WorkKey,
    pub payload: P,
}

impl<P> WorkItem<P> {
    pub fn new(key: impl Into<WorkKey>, payload: P) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}
