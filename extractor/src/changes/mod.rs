//! Change detection against the MarcOut endpoint.
//!
//! Resolves the set of bib and item identifiers that changed since a
//! watermark-derived begin time, and projects item-level changes onto the
//! bibs that own them so every affected record is re-synthesized.

pub mod items;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info};

use crate::changes::items::ItemChangeInfo;
use crate::error::ExtractResult;
use crate::protocol::client::SoapTransport;
use crate::protocol::envelope;
use crate::state::SyncWatermark;

/// Bib and item identifiers reported as changed since the begin time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet {
    pub created_bibs: Vec<String>,
    pub updated_bibs: Vec<String>,
    pub deleted_bibs: Vec<String>,
    pub created_items: Vec<String>,
    pub updated_items: Vec<String>,
    pub deleted_items: Vec<String>,
}

impl ChangeSet {
    /// Number of bib records this change set touches.
    pub fn total_bibs(&self) -> usize {
        self.created_bibs.len() + self.updated_bibs.len() + self.deleted_bibs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_bibs() == 0
            && self.created_items.is_empty()
            && self.updated_items.is_empty()
            && self.deleted_items.is_empty()
    }

    /// Marks a bib as needing re-synthesis because one of its items changed.
    ///
    /// A bib already listed as created or updated is not listed twice.
    pub fn note_bib_updated(&mut self, bib_id: &str) {
        if self.created_bibs.iter().any(|id| id == bib_id)
            || self.updated_bibs.iter().any(|id| id == bib_id)
        {
            return;
        }
        self.updated_bibs.push(bib_id.to_string());
    }
}

/// Computes the begin time for the next change-detection pass.
///
/// A pending full update rewinds to the catalog epoch. A bulk export newer
/// than the last incremental pass rewinds to one hour before that export, so
/// API-side changes that raced the export are not lost. With no history at
/// all, the last day is scanned.
pub fn effective_begin_time(watermark: &SyncWatermark, now: DateTime<Utc>) -> DateTime<Utc> {
    if watermark.run_full_update {
        return catalog_epoch();
    }
    match (watermark.last_changed_records, watermark.last_bulk_export) {
        (Some(changed), Some(bulk)) if bulk > changed => bulk - Duration::hours(1),
        (None, Some(bulk)) => bulk - Duration::hours(1),
        (Some(changed), _) => changed,
        (None, None) => now - Duration::hours(24),
    }
}

fn catalog_epoch() -> DateTime<Utc> {
    // Predates any record in a live catalog, so a full update sees everything.
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Fetches the identifiers of all bibs and items changed since `begin_time`.
///
/// Both detection calls must succeed; a failure here aborts the cycle so the
/// watermark stays put and the same window is retried.
pub async fn resolve<T: SoapTransport>(
    transport: &T,
    begin_time: DateTime<Utc>,
) -> ExtractResult<ChangeSet> {
    let begin_time = envelope::format_begin_time(begin_time);
    debug!(begin_time, "detecting changes");

    let bibs = envelope::parse_changed_bibs(
        &transport
            .post_envelope(&envelope::changed_bibs_request(&begin_time))
            .await?,
    )?;
    let items = envelope::parse_changed_items(
        &transport
            .post_envelope(&envelope::changed_items_request(&begin_time))
            .await?,
    )?;

    let change_set = ChangeSet {
        created_bibs: bibs.created,
        updated_bibs: bibs.updated,
        deleted_bibs: bibs.deleted,
        created_items: items.created,
        updated_items: items.updated,
        deleted_items: items.deleted,
    };
    info!(
        created_bibs = change_set.created_bibs.len(),
        updated_bibs = change_set.updated_bibs.len(),
        deleted_bibs = change_set.deleted_bibs.len(),
        created_items = change_set.created_items.len(),
        updated_items = change_set.updated_items.len(),
        deleted_items = change_set.deleted_items.len(),
        "change detection complete"
    );
    Ok(change_set)
}

/// Projects fetched item details onto the owning bibs so that a bib whose
/// items changed is re-synthesized even when the bib itself did not change.
pub fn project_item_changes(change_set: &mut ChangeSet, items: &[ItemChangeInfo]) {
    for item in items {
        if !item.bib_id.is_empty() {
            change_set.note_bib_updated(&item.bib_id);
        }
    }
}
