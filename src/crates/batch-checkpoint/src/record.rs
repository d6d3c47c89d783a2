//! Result, failure, and checkpoint-state records.

use crate::item::WorkKey;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Ordered column/value pairs produced by a processor for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any earlier value for the same column.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Output of successfully processing one work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub key: WorkKey,
    pub fields: Fields,
    pub processed_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(key: WorkKey, fields: Fields) -> Self {
        Self {
            key,
            fields,
            processed_at: Utc::now(),
        }
    }
}

/// Classification of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Timeout,
    MalformedPayload,
    ContentRejected,
    ServiceError,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::MalformedPayload => "malformed_payload",
            Self::ContentRejected => "content_rejected",
            Self::ServiceError => "service_error",
            Self::Unexpected => "unexpected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_found" => Some(Self::NotFound),
            "timeout" => Some(Self::Timeout),
            "malformed_payload" => Some(Self::MalformedPayload),
            "content_rejected" => Some(Self::ContentRejected),
            "service_error" => Some(Self::ServiceError),
            "unexpected" => Some(Self::Unexpected),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by an [`ItemProcessor`](crate::ItemProcessor) for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// Fragment of the original payload, kept for diagnostics.
    pub context: Option<String>,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Durable record of a failed attempt.
///
/// Superseded by a later [`ResultRecord`] for the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub key: WorkKey,
    pub kind: FailureKind,
    pub detail: String,
    pub context: Option<String>,
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn from_failure(key: WorkKey, failure: ItemFailure) -> Self {
        Self {
            key,
            kind: failure.kind,
            detail: failure.detail,
            context: failure.context,
            failed_at: Utc::now(),
        }
    }
}

/// Everything the durable store knows: the snapshot a flush writes out and
/// a load reads back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointState {
    results: BTreeMap<WorkKey, ResultRecord>,
    failures: BTreeMap<WorkKey, FailureRecord>,
    pub last_saved: Option<DateTime<Utc>>,
    pub checkpoint: u64,
}

impl CheckpointState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a success. Replaces any earlier result for the key and clears
    /// its failure. Returns true if the key was not completed before.
    pub fn record_success(&mut self, record: ResultRecord) -> bool {
        self.failures.remove(&record.key);
        self.results.insert(record.key, record).is_none()
    }

    /// Record a failure unless the key already has a result.
    pub fn record_failure(&mut self, record: FailureRecord) -> bool {
        if self.results.contains_key(&record.key) {
            return false;
        }
        self.failures.insert(record.key, record);
        true
    }

    pub fn is_completed(&self, key: WorkKey) -> bool {
        self.results.contains_key(&key)
    }

    pub fn completed_keys(&self) -> BTreeSet<WorkKey> {
        self.results.keys().copied().collect()
    }

    pub fn results(&self) -> impl Iterator<Item = &ResultRecord> {
        self.results.values()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.failures.values()
    }

    pub fn result(&self, key: WorkKey) -> Option<&ResultRecord> {
        self.results.get(&key)
    }

    pub fn failure(&self, key: WorkKey) -> Option<&FailureRecord> {
        self.failures.get(&key)
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}
