//! Shared fakes for job tests

#![allow(dead_code)]

use async_trait::async_trait;
use batch_checkpoint::{CheckpointState, CompletionLedger};
use llm::{LlmError, Summarizer};
use metabase_client::{Card, CardListing, CardLookup, Collection, MetabaseError};
use reportctx::{JobKind, JobPlan, ReportctxConfig, RunOverrides};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

pub const SUMMARY: &str = "**Business Question:** What did we sell?\n\
**Primary Metric(s):**\n\
- Revenue\n\
**Key Filters / Levers:**\n\
- Last 30 days\n\
**Final Summary:** Recent revenue.";

/// Summarizer that answers from the report name embedded in the prompt.
///
/// Reports whose name contains `Blocked` are refused; names containing
/// `Broken` produce a service error.
#[derive(Default)]
pub struct FakeSummarizer {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, prompt: &str) -> llm::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if prompt.contains("Report Name: Blocked") {
            return Err(LlmError::ContentBlocked("finish reason SAFETY".into()));
        }
        if prompt.contains("Report Name: Broken") {
            return Err(LlmError::ServiceUnavailable("503".into()));
        }
        Ok(SUMMARY.to_string())
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// Card lookup served from memory. Ids in `errors` fail with a 500.
#[derive(Default)]
pub struct FakeCards {
    pub cards: HashMap<u64, Card>,
    pub collections: Vec<Collection>,
    pub errors: Vec<u64>,
    pub calls: AtomicUsize,
}

impl FakeCards {
    pub fn with_card(mut self, card: serde_json::Value) -> Self {
        let card: Card = serde_json::from_value(card).unwrap();
        self.cards.insert(card.id, card);
        self
    }

    pub fn with_collection(mut self, collection: serde_json::Value) -> Self {
        self.collections.push(serde_json::from_value(collection).unwrap());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardListing for FakeCards {
    async fn list_cards(&self) -> metabase_client::Result<Vec<Card>> {
        let mut cards: Vec<Card> = self.cards.values().cloned().collect();
        cards.sort_by_key(|card| card.id);
        Ok(cards)
    }

    async fn list_collections(&self) -> metabase_client::Result<Vec<Collection>> {
        Ok(self.collections.clone())
    }
}

#[async_trait]
impl CardLookup for FakeCards {
    async fn get_card(&self, id: u64) -> metabase_client::Result<Option<Card>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.errors.contains(&id) {
            return Err(MetabaseError::ApiError {
                status: 500,
                body: "internal".into(),
            });
        }
        Ok(self.cards.get(&id).cloned())
    }
}

pub fn write_catalog(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Config rooted in `dir` with no pacing, so tests run instantly.
pub fn config(dir: &TempDir, catalog: &Path) -> ReportctxConfig {
    let mut config = ReportctxConfig::default();
    config.catalog.path = Some(catalog.to_path_buf());
    config.store.dir = dir.path().join("out");
    config.execution.min_call_interval_ms = 0;
    config.execution.item_timeout_secs = 5;
    config.execution.checkpoint_every = 2;
    config
}

pub fn plan(kind: JobKind, config: &ReportctxConfig) -> JobPlan {
    JobPlan::from_config(kind, config, &RunOverrides::default()).unwrap()
}

pub async fn reload(plan: &JobPlan) -> CheckpointState {
    let (_, state) = CompletionLedger::load(&plan.store()).await.unwrap();
    state
}
