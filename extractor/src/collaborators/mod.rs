//! Downstream collaborator seams.
//!
//! The connector hands every synthesized record to a grouper, which merges
//! duplicate manifestations into grouped works, and forwards the resulting
//! permanent id to an indexer. A cycle log accumulates counters and notes for
//! the run record. All three are traits so tests and memory deployments can
//! run without the discovery stack.

pub mod logging;
pub mod memory;

use std::collections::HashSet;
use std::future::Future;

use tracing::warn;

use crate::error::ExtractResult;
use crate::marc::Record;

/// What the grouper decided when a record was removed from its work.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoveRecordOutcome {
    /// The work survives with other records and must be reindexed.
    pub reindex_work: bool,
    /// The record was the work's last member and the work must be deleted.
    pub delete_work: bool,
    pub permanent_id: Option<String>,
    pub grouped_work_id: Option<String>,
}

/// Groups synthesized records into works.
pub trait RecordGrouper {
    /// Processes one record, returning the permanent id of its grouped work,
    /// or `None` when the record is suppressed from discovery.
    ///
    /// `record_id` is the normalized file id; it is the record's identity for
    /// [`RecordGrouper::remove_record`] and [`RecordGrouper::known_record_ids`].
    fn process_record(
        &self,
        source: &str,
        record_id: &str,
        record: &Record,
        force_refresh: bool,
    ) -> impl Future<Output = ExtractResult<Option<String>>> + Send;

    /// Removes a record from its grouped work.
    fn remove_record(
        &self,
        source: &str,
        record_id: &str,
    ) -> impl Future<Output = ExtractResult<RemoveRecordOutcome>> + Send;

    /// All record ids of a source currently known to the grouper. Used by the
    /// bulk path to detect records missing from a full export.
    fn known_record_ids(
        &self,
        source: &str,
    ) -> impl Future<Output = ExtractResult<HashSet<String>>> + Send;
}

/// Keeps the discovery index in step with grouped works.
pub trait WorkIndexer {
    /// Reindexes one grouped work by its permanent id.
    fn process_grouped_work(
        &self,
        permanent_id: &str,
    ) -> impl Future<Output = ExtractResult<()>> + Send;

    /// Drops a deleted work from the index.
    fn delete_record(
        &self,
        permanent_id: &str,
        grouped_work_id: &str,
    ) -> impl Future<Output = ExtractResult<()>> + Send;
}

/// Run record for one extraction cycle: counters, notes, and checkpoints.
pub trait ExtractLog {
    fn inc_added(&self);
    fn inc_updated(&self);
    fn inc_deleted(&self);
    fn inc_skipped(&self);
    fn inc_errors(&self);
    fn inc_products(&self);
    fn set_num_products(&self, total: usize);
    fn add_note(&self, note: &str);
    fn has_errors(&self) -> bool;

    /// Checkpoints the run record mid-cycle.
    fn save_results(&self) -> impl Future<Output = ()> + Send;

    /// Marks the cycle finished and writes the final run record.
    fn set_finished(&self) -> impl Future<Output = ()> + Send;
}

/// Removes a record from grouping and propagates the result to the indexer.
///
/// Shared by bib deletions and bulk-export leftover cleanup.
pub async fn remove_record_from_work<G, X>(
    grouper: &G,
    indexer: &X,
    source: &str,
    record_id: &str,
) -> ExtractResult<()>
where
    G: RecordGrouper,
    X: WorkIndexer,
{
    let outcome = grouper.remove_record(source, record_id).await?;
    if outcome.reindex_work {
        if let Some(permanent_id) = &outcome.permanent_id {
            indexer.process_grouped_work(permanent_id).await?;
            return Ok(());
        }
    } else if outcome.delete_work
        && let (Some(permanent_id), Some(grouped_work_id)) =
            (&outcome.permanent_id, &outcome.grouped_work_id)
    {
        indexer.delete_record(permanent_id, grouped_work_id).await?;
        return Ok(());
    }
    warn!(source, record_id, "record removal resolved to no known work");
    Ok(())
}
