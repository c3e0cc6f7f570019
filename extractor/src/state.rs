use chrono::{DateTime, Utc};

/// Per-profile synchronization watermarks.
///
/// Watermarks only move forward after a cycle completes without errors, so a
/// failed cycle is retried from the same point. All timestamps are UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncWatermark {
    /// When incremental change detection last completed successfully.
    pub last_changed_records: Option<DateTime<Utc>>,
    /// When a full update last completed successfully.
    pub last_full_update: Option<DateTime<Utc>>,
    /// Modification time of the newest bulk export file already consumed.
    pub last_bulk_export: Option<DateTime<Utc>>,
    /// Operator request to reprocess the entire catalog on the next cycle.
    pub run_full_update: bool,
}
