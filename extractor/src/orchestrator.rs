//! The extraction loop.
//!
//! Each cycle selects a mode, applies every detected change, rebuilds the
//! holds summary, and advances exactly one watermark when it finishes without
//! errors. Per-cycle collaborators (log, synthesizer, bulk processor) are
//! constructed fresh each cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::IndexingProfileConfig;
use tracing::{debug, error, info, warn};

use crate::bulk::BulkFileProcessor;
use crate::changes::{self, items};
use crate::collaborators::{
    ExtractLog, RecordGrouper, WorkIndexer, remove_record_from_work,
};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, ExtractResult};
use crate::holds::{self, HoldsSink, HoldsSource};
use crate::mode::{self, ExtractionMode};
use crate::protocol::client::SoapTransport;
use crate::state::SyncWatermark;
use crate::store::records::{RecordStore, normalize_record_id};
use crate::store::state::WatermarkStore;
use crate::bail;
use crate::synthesis::{BibSynthesizer, PendingChanges};

/// Sleep lengths between cycles.
#[derive(Debug, Clone, Copy)]
pub struct CyclePacing {
    /// Pause after a cycle that applied changes cleanly.
    pub busy: Duration,
    /// Pause after an empty cycle or one that hit errors.
    pub idle: Duration,
}

impl Default for CyclePacing {
    fn default() -> Self {
        Self {
            busy: Duration::from_secs(60),
            idle: Duration::from_secs(300),
        }
    }
}

/// Source and sink pair for the holds rebuild.
pub struct HoldsExport<H, K> {
    pub source: H,
    pub sink: K,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub changes: usize,
    pub had_errors: bool,
}

/// Drives extraction cycles until shutdown.
pub struct Orchestrator<T, W, G, X, H, K, F> {
    profile: IndexingProfileConfig,
    pacing: CyclePacing,
    transport: T,
    watermarks: W,
    records: RecordStore,
    grouper: G,
    indexer: X,
    holds: Option<HoldsExport<H, K>>,
    make_log: F,
}

impl<T, W, G, X, H, K, L, F> Orchestrator<T, W, G, X, H, K, F>
where
    T: SoapTransport,
    W: WatermarkStore,
    G: RecordGrouper,
    X: WorkIndexer,
    H: HoldsSource,
    K: HoldsSink,
    L: ExtractLog,
    F: Fn() -> L,
{
    pub fn new(
        profile: IndexingProfileConfig,
        pacing: CyclePacing,
        transport: T,
        watermarks: W,
        grouper: G,
        indexer: X,
        holds: Option<HoldsExport<H, K>>,
        make_log: F,
    ) -> Self {
        let records = RecordStore::new(&profile.record_store_path);
        Self {
            profile,
            pacing,
            transport,
            watermarks,
            records,
            grouper,
            indexer,
            holds,
            make_log,
        }
    }

    /// Runs cycles until the shutdown signal fires.
    ///
    /// A cycle in progress always finishes; the signal is only observed
    /// between cycles.
    pub async fn run(self, mut shutdown_rx: ShutdownRx) -> ExtractResult<()> {
        info!(profile = self.profile.name, "starting extraction loop");
        loop {
            let outcome = self.run_cycle().await;
            let pause = if outcome.changes > 0 && !outcome.had_errors {
                self.pacing.busy
            } else {
                self.pacing.idle
            };
            debug!(
                changes = outcome.changes,
                had_errors = outcome.had_errors,
                pause_secs = pause.as_secs(),
                "cycle complete"
            );
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown_rx.changed() => {
                    info!("shutdown requested, stopping extraction loop");
                    return Ok(());
                }
            }
        }
    }

    /// Runs a single extraction cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let log = (self.make_log)();
        let cycle_start = Utc::now();
        let changes = match self.update_records(&log, cycle_start).await {
            Ok(changes) => changes,
            Err(err) => {
                error!(error = %err, "extraction cycle failed");
                log.inc_errors();
                log.add_note(&format!("cycle failed: {err}"));
                0
            }
        };
        self.export_holds(&log).await;
        log.set_finished().await;
        CycleOutcome {
            changes,
            had_errors: log.has_errors(),
        }
    }

    async fn update_records<E: ExtractLog>(
        &self,
        log: &E,
        cycle_start: DateTime<Utc>,
    ) -> ExtractResult<usize> {
        let watermark = self.watermarks.load().await?;
        let scan = mode::scan_export_files(&self.profile.bulk_export_path)?;
        match mode::select_mode(&scan, &watermark, cycle_start) {
            ExtractionMode::BulkFile {
                files,
                latest_export,
            } => {
                log.add_note("updating from bulk export");
                self.update_from_bulk(log, &watermark, cycle_start, &files, latest_export)
                    .await
            }
            ExtractionMode::IncrementalApi => {
                self.update_from_api(log, &watermark, cycle_start).await
            }
        }
    }

    async fn update_from_bulk<E: ExtractLog>(
        &self,
        log: &E,
        watermark: &SyncWatermark,
        cycle_start: DateTime<Utc>,
        files: &[std::path::PathBuf],
        latest_export: DateTime<Utc>,
    ) -> ExtractResult<usize> {
        let processor = BulkFileProcessor {
            profile: &self.profile,
            store: &self.records,
            grouper: &self.grouper,
            indexer: &self.indexer,
            log,
        };
        let changes = processor.run(files, watermark.run_full_update).await?;

        // The export was consumed even when some records failed; the next
        // incremental pass rewinds behind this point and recovers them.
        self.watermarks.set_last_bulk_export(latest_export).await?;
        if watermark.run_full_update && !log.has_errors() {
            self.watermarks.set_last_full_update(cycle_start).await?;
        }
        Ok(changes)
    }

    async fn update_from_api<E: ExtractLog>(
        &self,
        log: &E,
        watermark: &SyncWatermark,
        cycle_start: DateTime<Utc>,
    ) -> ExtractResult<usize> {
        let begin_time = changes::effective_begin_time(watermark, cycle_start);
        let mut change_set = changes::resolve(&self.transport, begin_time).await?;

        let updated_fetch =
            items::fetch_item_details(&self.transport, &change_set.updated_items, &self.profile)
                .await;
        if updated_fetch.had_errors {
            bail!(
                ErrorKind::ProtocolError,
                "item details incomplete for updated items"
            );
        }
        let created_fetch =
            items::fetch_item_details(&self.transport, &change_set.created_items, &self.profile)
                .await;
        if created_fetch.had_errors {
            bail!(
                ErrorKind::ProtocolError,
                "item details incomplete for created items"
            );
        }
        // Deleted items cannot always be looked up anymore; what can be
        // resolved projects its owning bib, the rest match stored holdings.
        let deleted_fetch =
            items::fetch_item_details(&self.transport, &change_set.deleted_items, &self.profile)
                .await;
        if deleted_fetch.had_errors {
            log.add_note("item details incomplete for deleted items");
        }

        changes::project_item_changes(&mut change_set, &updated_fetch.items);
        changes::project_item_changes(&mut change_set, &created_fetch.items);
        changes::project_item_changes(&mut change_set, &deleted_fetch.items);

        log.set_num_products(change_set.total_bibs());
        let mut changes = 0;

        if change_set.is_empty() {
            debug!("no changes detected");
        } else {
            let mut pending = PendingChanges::new(
                updated_fetch.items,
                created_fetch.items,
                change_set.deleted_items.clone(),
            );
            let synthesizer = BibSynthesizer {
                transport: &self.transport,
                store: &self.records,
                profile: &self.profile,
                grouper: &self.grouper,
                indexer: &self.indexer,
                log,
            };

            changes += synthesizer
                .synthesize_bibs(&change_set.updated_bibs, &mut pending, false)
                .await;
            changes += self.delete_bibs(log, &change_set.deleted_bibs).await;
            changes += synthesizer
                .synthesize_bibs(&change_set.created_bibs, &mut pending, true)
                .await;

            let unmatched = pending.remaining_deleted_item_ids();
            if !unmatched.is_empty() {
                debug!(count = unmatched.len(), ?unmatched, "deleted items without stored holdings");
                log.add_note(&format!(
                    "{} deleted items not matched to stored holdings",
                    unmatched.len()
                ));
            }
        }

        if log.has_errors() {
            warn!("cycle had errors, watermarks not advanced");
        } else if watermark.run_full_update {
            // A full update advances only its own watermark; the incremental
            // watermark stays put and the next pass overlaps the full scan.
            self.watermarks.set_last_full_update(cycle_start).await?;
        } else {
            self.watermarks.set_last_changed_records(cycle_start).await?;
        }
        Ok(changes)
    }

    async fn delete_bibs<E: ExtractLog>(&self, log: &E, bib_ids: &[String]) -> usize {
        let mut deleted = 0;
        for bib_id in bib_ids {
            let file_id = normalize_record_id(bib_id, &self.profile.record_prefix);
            let removal = remove_record_from_work(
                &self.grouper,
                &self.indexer,
                &self.profile.name,
                &file_id,
            )
            .await
            .and_then(|()| self.records.delete(&file_id));
            match removal {
                Ok(()) => {
                    log.inc_deleted();
                    deleted += 1;
                }
                Err(err) => {
                    error!(bib_id, error = %err, "failed to delete bib");
                    log.inc_errors();
                    log.add_note(&format!("failed to delete bib {bib_id}: {err}"));
                }
            }
        }
        deleted
    }

    /// Rebuilds the holds summary when a source is configured. Failures are
    /// counted but never abort the cycle; holds churn does not count as
    /// record changes for pacing.
    async fn export_holds<E: ExtractLog>(&self, log: &E) {
        let Some(export) = &self.holds else {
            return;
        };
        if let Err(err) = holds::export_holds(&export.source, &export.sink).await {
            error!(error = %err, "holds rebuild failed");
            log.inc_errors();
            log.add_note(&format!("holds rebuild failed: {err}"));
        }
    }
}
