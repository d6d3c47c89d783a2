//! Completion ledger: which work is already durably done.

use crate::error::Result;
use crate::gaps::GapReport;
use crate::item::WorkKey;
use crate::record::{CheckpointState, ResultRecord};
use crate::store::CheckpointStore;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{info, warn};

/// Set of completed keys reconstructed from a [`CheckpointStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionLedger {
    completed: BTreeSet<WorkKey>,
    failed: BTreeSet<WorkKey>,
    source: PathBuf,
    duplicates_collapsed: usize,
}

impl CompletionLedger {
    /// Load committed state and derive the ledger from it.
    ///
    /// An absent store yields an empty ledger. A corrupt store is an error;
    /// it is never treated as empty.
    pub async fn load<S>(store: &S) -> Result<(Self, CheckpointState)>
    where
        S: CheckpointStore + ?Sized,
    {
        let source = store.location();

        let Some(snapshot) = store.load().await? else {
            info!(path = %source.display(), "No prior results, starting fresh");
            let ledger = Self {
                completed: BTreeSet::new(),
                failed: BTreeSet::new(),
                source,
                duplicates_collapsed: 0,
            };
            return Ok((ledger, CheckpointState::new()));
        };

        let found = snapshot.results.len();
        let newest = collapse_duplicates(snapshot.results);
        let duplicates_collapsed = found - newest.len();
        if duplicates_collapsed > 0 {
            warn!(
                path = %source.display(),
                duplicates = duplicates_collapsed,
                "Result store held duplicate keys; keeping the newest of each"
            );
        }

        let mut state = CheckpointState::new();
        for record in newest {
            state.record_success(record);
        }
        for failure in snapshot.failures {
            state.record_failure(failure);
        }

        if let Some(hint) = snapshot.hint {
            state.checkpoint = hint.checkpoint;
            state.last_saved = hint.last_save;

            let hinted: BTreeSet<WorkKey> = hint.completed_keys.into_iter().collect();
            if hinted != state.completed_keys() {
                warn!(
                    hinted = hinted.len(),
                    stored = state.result_count(),
                    "State hint disagrees with result store; using result store"
                );
            }
        }

        let ledger = Self {
            completed: state.completed_keys(),
            failed: state.failures().map(|f| f.key).collect(),
            source,
            duplicates_collapsed,
        };

        info!(
            path = %ledger.source.display(),
            completed = ledger.completed.len(),
            failed = ledger.failed.len(),
            checkpoint = state.checkpoint,
            "Completion ledger loaded"
        );

        Ok((ledger, state))
    }

    pub fn completed(&self) -> &BTreeSet<WorkKey> {
        &self.completed
    }

    pub fn is_completed(&self, key: WorkKey) -> bool {
        self.completed.contains(&key)
    }

    /// Keys with a recorded failure and no result. Diagnostic only.
    pub fn failed(&self) -> &BTreeSet<WorkKey> {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn source(&self) -> &PathBuf {
        &self.source
    }

    pub fn duplicates_collapsed(&self) -> usize {
        self.duplicates_collapsed
    }

    pub fn gap_report<I>(&self, catalog_keys: I) -> GapReport
    where
        I: IntoIterator<Item = WorkKey>,
    {
        GapReport::new(catalog_keys, &self.completed)
    }
}

/// Keep one record per key: the one with the latest `processed_at`.
fn collapse_duplicates(records: Vec<ResultRecord>) -> Vec<ResultRecord> {
    let mut newest: BTreeMap<WorkKey, ResultRecord> = BTreeMap::new();
    for record in records {
        match newest.get(&record.key) {
            Some(existing) if existing.processed_at > record.processed_at => {}
            _ => {
                newest.insert(record.key, record);
            }
        }
    }
    newest.into_values().collect()
}
