//! Work catalogs: the enumerable universe of work items for a run.

use crate::error::{CheckpointError, Result};
use crate::item::{KeyScheme, WorkItem, WorkKey};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of work items, enumerated once at the start of a run.
pub trait WorkCatalog {
    type Payload;

    /// Enumerate every work item in catalog order.
    fn enumerate(&self) -> Result<Vec<WorkItem<Self::Payload>>>;
}

/// Where a catalog row's key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// 1-based position of the data row.
    Position,
    /// An explicit id column, parsed with the catalog's [`KeyScheme`].
    Column(String),
}

/// Catalog backed by a CSV source table with a header row.
///
/// Each data row is deserialized into `P` by header name, so `P` decides
/// which columns it reads and how empty cells are represented.
pub struct CsvCatalog<P> {
    path: PathBuf,
    key_source: KeySource,
    key_scheme: KeyScheme,
    required_columns: Vec<String>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> CsvCatalog<P> {
    pub fn new(path: impl Into<PathBuf>, key_source: KeySource) -> Self {
        Self {
            path: path.into(),
            key_source,
            key_scheme: KeyScheme::Numeric,
            required_columns: Vec::new(),
            _payload: PhantomData,
        }
    }

    pub fn with_key_scheme(mut self, scheme: KeyScheme) -> Self {
        self.key_scheme = scheme;
        self
    }

    pub fn with_required_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl Into<String>) -> CheckpointError {
        CheckpointError::catalog(&self.path, reason)
    }
}

impl<P: DeserializeOwned> WorkCatalog for CsvCatalog<P> {
    type Payload = P;

    fn enumerate(&self) -> Result<Vec<WorkItem<P>>> {
        if !self.path.exists() {
            return Err(self.error("file not found"));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|e| self.error(e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| self.error(format!("unreadable header row: {}", e)))?
            .clone();

        let mut missing: Vec<&str> = self
            .required_columns
            .iter()
            .map(String::as_str)
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();

        let key_index = match &self.key_source {
            KeySource::Position => None,
            KeySource::Column(name) => {
                let index = headers.iter().position(|h| h == name);
                if index.is_none() && !missing.contains(&name.as_str()) {
                    missing.push(name.as_str());
                }
                index
            }
        };

        if !missing.is_empty() {
            return Err(self.error(format!("missing required columns: {}", missing.join(", "))));
        }

        let mut items = Vec::new();
        let mut seen = HashSet::new();

        for (row, record) in reader.records().enumerate() {
            let line = row + 2;
            let record = record.map_err(|e| self.error(format!("line {}: {}", line, e)))?;

            let key = match key_index {
                None => WorkKey::new(row as u64 + 1),
                Some(index) => {
                    let label = record.get(index).unwrap_or_default();
                    self.key_scheme
                        .parse(label)
                        .map_err(|e| self.error(format!("line {}: {}", line, e)))?
                }
            };

            if !seen.insert(key) {
                return Err(self.error(format!("line {}: duplicate key {}", line, key)));
            }

            let payload: P = record
                .deserialize(Some(&headers))
                .map_err(|e| self.error(format!("line {}: {}", line, e)))?;

            items.push(WorkItem { key, payload });
        }

        debug!(path = %self.path.display(), columns = headers.len(), "Catalog header validated");
        info!(path = %self.path.display(), items = items.len(), "Catalog loaded");
        Ok(items)
    }
}
