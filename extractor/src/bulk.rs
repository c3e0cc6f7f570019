//! Bulk export processing.
//!
//! Walks full MARC export files record by record, persists each record that
//! differs from the stored copy, and reconciles the grouper's known-record
//! set against the export: any known record absent from a full export was
//! deleted on the ILS side and is removed from its work.

use std::path::{Path, PathBuf};

use config::shared::IndexingProfileConfig;
use tracing::{debug, error, info, warn};

use crate::collaborators::{ExtractLog, RecordGrouper, WorkIndexer, remove_record_from_work};
use crate::error::ExtractResult;
use crate::marc::RecordReader;
use crate::store::records::{MarcStatus, RecordStore, normalize_record_id};

/// Run-record checkpoint interval, in records.
const CHECKPOINT_INTERVAL: usize = 250;

/// Processes bulk export files for one cycle.
pub struct BulkFileProcessor<'a, G, X, L> {
    pub profile: &'a IndexingProfileConfig,
    pub store: &'a RecordStore,
    pub grouper: &'a G,
    pub indexer: &'a X,
    pub log: &'a L,
}

impl<G, X, L> BulkFileProcessor<'_, G, X, L>
where
    G: RecordGrouper,
    X: WorkIndexer,
    L: ExtractLog,
{
    /// Processes the given export files, returning the number of records
    /// added, updated, or deleted.
    ///
    /// With `force_refresh` set every record is reprocessed even when its
    /// stored copy is identical, which is how a requested full update runs.
    pub async fn run(&self, files: &[PathBuf], force_refresh: bool) -> ExtractResult<usize> {
        let mut known = self.grouper.known_record_ids(&self.profile.name).await?;
        let mut changes = 0;
        let mut processed = 0;

        for path in files {
            info!(path = %path.display(), "processing bulk export file");
            let bytes = tokio::fs::read(path).await?;
            for record in RecordReader::new(&bytes) {
                let record = match record {
                    Ok(record) => record,
                    Err(err) => {
                        error!(path = %path.display(), error = %err, "skipping undecodable export record");
                        self.log.inc_errors();
                        self.log.add_note(&format!(
                            "undecodable record in {}: {err}",
                            path.display()
                        ));
                        continue;
                    }
                };
                self.log.inc_products();
                processed += 1;
                if processed % CHECKPOINT_INTERVAL == 0 {
                    self.log.save_results().await;
                }

                let Some(control_number) = record.control_number() else {
                    warn!(path = %path.display(), "skipping export record without a control number");
                    self.log.inc_skipped();
                    continue;
                };
                let file_id = normalize_record_id(control_number, &self.profile.record_prefix);
                known.remove(&file_id);

                match self.process_record(&file_id, &record, force_refresh, path).await {
                    Ok(true) => changes += 1,
                    Ok(false) => {}
                    Err(err) => {
                        error!(file_id, error = %err, "failed to process export record");
                        self.log.inc_errors();
                        self.log
                            .add_note(&format!("failed to process {file_id}: {err}"));
                    }
                }
            }
        }

        // Records known to the grouper but absent from a full export were
        // deleted on the ILS side.
        for file_id in known {
            debug!(file_id, "record missing from full export, removing");
            match remove_record_from_work(self.grouper, self.indexer, &self.profile.name, &file_id)
                .await
            {
                Ok(()) => {
                    self.store.delete(&file_id)?;
                    self.log.inc_deleted();
                    changes += 1;
                }
                Err(err) => {
                    error!(file_id, error = %err, "failed to remove record missing from export");
                    self.log.inc_errors();
                }
            }
        }

        self.log.save_results().await;
        Ok(changes)
    }

    async fn process_record(
        &self,
        file_id: &str,
        record: &crate::marc::Record,
        force_refresh: bool,
        path: &Path,
    ) -> ExtractResult<bool> {
        let status = self.store.save_if_changed(file_id, record)?;
        if status == MarcStatus::Unchanged && !force_refresh {
            self.log.inc_skipped();
            return Ok(false);
        }

        match self
            .grouper
            .process_record(&self.profile.name, file_id, record, force_refresh)
            .await?
        {
            Some(permanent_id) => {
                self.indexer.process_grouped_work(&permanent_id).await?;
                match status {
                    MarcStatus::New => self.log.inc_added(),
                    _ => self.log.inc_updated(),
                }
            }
            None => {
                debug!(file_id, path = %path.display(), "export record suppressed from discovery");
                remove_record_from_work(
                    self.grouper,
                    self.indexer,
                    &self.profile.name,
                    file_id,
                )
                .await?;
                self.log.inc_deleted();
            }
        }
        Ok(true)
    }
}
