use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::collaborators::{ExtractLog, RecordGrouper, RemoveRecordOutcome, WorkIndexer};
use crate::error::ExtractResult;
use crate::marc::Record;

#[derive(Debug, Default)]
struct GrouperInner {
    /// record id -> permanent id of the grouped work it belongs to.
    records: HashMap<String, String>,
    suppressed: HashSet<String>,
    processed: Vec<(String, bool)>,
    removed: Vec<(String, String)>,
}

/// In-memory grouper for tests and memory deployments.
///
/// Each record forms its own grouped work with a derived permanent id, which
/// keeps outcomes deterministic without a grouping database.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordGrouper {
    inner: Arc<Mutex<GrouperInner>>,
}

impl MemoryRecordGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    fn permanent_id(source: &str, record_id: &str) -> String {
        format!("{source}:{record_id}")
    }

    /// Seeds a record id as already known, as if grouped by an earlier run.
    pub async fn insert_known(&self, source: &str, record_id: &str) {
        let permanent_id = Self::permanent_id(source, record_id);
        self.inner
            .lock()
            .await
            .records
            .insert(record_id.to_string(), permanent_id);
    }

    /// Marks a record id as suppressed from discovery.
    pub async fn suppress(&self, record_id: &str) {
        self.inner.lock().await.suppressed.insert(record_id.to_string());
    }

    /// Record ids processed so far, with their force-refresh flag.
    pub async fn processed(&self) -> Vec<(String, bool)> {
        self.inner.lock().await.processed.clone()
    }

    /// `(source, record_id)` pairs removed so far.
    pub async fn removed(&self) -> Vec<(String, String)> {
        self.inner.lock().await.removed.clone()
    }
}

impl RecordGrouper for MemoryRecordGrouper {
    async fn process_record(
        &self,
        source: &str,
        record_id: &str,
        _record: &Record,
        force_refresh: bool,
    ) -> ExtractResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        inner.processed.push((record_id.to_string(), force_refresh));
        if inner.suppressed.contains(record_id) {
            return Ok(None);
        }
        let permanent_id = Self::permanent_id(source, record_id);
        inner
            .records
            .insert(record_id.to_string(), permanent_id.clone());
        Ok(Some(permanent_id))
    }

    async fn remove_record(
        &self,
        source: &str,
        record_id: &str,
    ) -> ExtractResult<RemoveRecordOutcome> {
        let mut inner = self.inner.lock().await;
        inner
            .removed
            .push((source.to_string(), record_id.to_string()));
        match inner.records.remove(record_id) {
            Some(permanent_id) => Ok(RemoveRecordOutcome {
                reindex_work: false,
                delete_work: true,
                permanent_id: Some(permanent_id),
                grouped_work_id: Some(record_id.to_string()),
            }),
            None => Ok(RemoveRecordOutcome::default()),
        }
    }

    async fn known_record_ids(&self, _source: &str) -> ExtractResult<HashSet<String>> {
        Ok(self.inner.lock().await.records.keys().cloned().collect())
    }
}

/// In-memory indexer that records every call for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkIndexer {
    processed: Arc<Mutex<Vec<String>>>,
    deleted: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryWorkIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn processed(&self) -> Vec<String> {
        self.processed.lock().await.clone()
    }

    pub async fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().await.clone()
    }
}

impl WorkIndexer for MemoryWorkIndexer {
    async fn process_grouped_work(&self, permanent_id: &str) -> ExtractResult<()> {
        self.processed.lock().await.push(permanent_id.to_string());
        Ok(())
    }

    async fn delete_record(&self, permanent_id: &str, grouped_work_id: &str) -> ExtractResult<()> {
        self.deleted
            .lock()
            .await
            .push((permanent_id.to_string(), grouped_work_id.to_string()));
        Ok(())
    }
}

/// In-memory cycle log with inspectable counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryExtractLog {
    added: Arc<AtomicU64>,
    updated: Arc<AtomicU64>,
    deleted: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    products: Arc<AtomicU64>,
    num_products: Arc<AtomicU64>,
    saves: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    notes: Arc<std::sync::Mutex<Vec<String>>>,
}

impl MemoryExtractLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> u64 {
        self.added.load(Ordering::Relaxed)
    }

    pub fn updated(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn num_products(&self) -> u64 {
        self.num_products.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().map(|notes| notes.clone()).unwrap_or_default()
    }
}

impl ExtractLog for MemoryExtractLog {
    fn inc_added(&self) {
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_updated(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_products(&self) {
        self.products.fetch_add(1, Ordering::Relaxed);
    }

    fn set_num_products(&self, total: usize) {
        self.num_products.store(total as u64, Ordering::Relaxed);
    }

    fn add_note(&self, note: &str) {
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(note.to_string());
        }
    }

    fn has_errors(&self) -> bool {
        self.errors.load(Ordering::Relaxed) > 0
    }

    async fn save_results(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    async fn set_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}
