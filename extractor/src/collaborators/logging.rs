use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::collaborators::ExtractLog;

/// Cycle log that emits the run record through tracing.
///
/// Used by deployments without a run-record table; counters reset at
/// construction, so the orchestrator builds one per cycle.
#[derive(Debug, Default)]
pub struct TracingExtractLog {
    added: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    products: AtomicU64,
    num_products: AtomicU64,
}

impl TracingExtractLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtractLog for TracingExtractLog {
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
        info!(note, "cycle note");
    }

    fn has_errors(&self) -> bool {
        self.errors.load(Ordering::Relaxed) > 0
    }

    async fn save_results(&self) {
        info!(
            added = self.added.load(Ordering::Relaxed),
            updated = self.updated.load(Ordering::Relaxed),
            deleted = self.deleted.load(Ordering::Relaxed),
            skipped = self.skipped.load(Ordering::Relaxed),
            errors = self.errors.load(Ordering::Relaxed),
            products = self.products.load(Ordering::Relaxed),
            "cycle checkpoint"
        );
    }

    async fn set_finished(&self) {
        let errors = self.errors.load(Ordering::Relaxed);
        if errors > 0 {
            warn!(
                added = self.added.load(Ordering::Relaxed),
                updated = self.updated.load(Ordering::Relaxed),
                deleted = self.deleted.load(Ordering::Relaxed),
                skipped = self.skipped.load(Ordering::Relaxed),
                errors,
                total = self.num_products.load(Ordering::Relaxed),
                "cycle finished with errors"
            );
        } else {
            info!(
                added = self.added.load(Ordering::Relaxed),
                updated = self.updated.load(Ordering::Relaxed),
                deleted = self.deleted.load(Ordering::Relaxed),
                skipped = self.skipped.load(Ordering::Relaxed),
                total = self.num_products.load(Ordering::Relaxed),
                "cycle finished"
            );
        }
    }
}
