use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::ExtractResult;
use crate::state::SyncWatermark;

/// Trait for persisting a profile's synchronization watermarks.
///
/// The orchestrator advances exactly one watermark per successful cycle, so
/// setters are independent rather than a whole-struct save. Clearing the
/// full-update request is folded into [`WatermarkStore::set_last_full_update`]
/// because the two must move together.
pub trait WatermarkStore {
    /// Loads the current watermarks, creating default state on first use.
    fn load(&self) -> impl Future<Output = ExtractResult<SyncWatermark>> + Send;

    /// Records a successful incremental change-detection pass.
    fn set_last_changed_records(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = ExtractResult<()>> + Send;

    /// Records a successful full update and clears the pending request.
    fn set_last_full_update(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = ExtractResult<()>> + Send;

    /// Records the modification time of the newest consumed bulk export.
    fn set_last_bulk_export(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = ExtractResult<()>> + Send;
}
