//! Bib record synthesis.
//!
//! Fetches fresh bib records in batches and merges locally-known item
//! holdings into them. The fresh record is authoritative for everything
//! except holdings fields, which only exist locally: they are carried over
//! from the stored prior record and updated from pending item changes.

pub mod merge;

use config::shared::IndexingProfileConfig;
use tracing::{debug, error, warn};

use crate::changes::items::ItemChangeInfo;
use crate::collaborators::{ExtractLog, RecordGrouper, WorkIndexer};
use crate::error::ExtractResult;
use crate::marc::{DataField, Record};
use crate::protocol::batch;
use crate::protocol::client::SoapTransport;
use crate::protocol::envelope;
use crate::store::records::{RecordStore, normalize_record_id};
use crate::synthesis::merge::apply_item_change;

/// Item changes not yet applied to a holdings field.
///
/// Every entry is consumed at most once: applying an item to one bib removes
/// it from the pending set, so a duplicate holdings field on another bib
/// cannot replay the change.
#[derive(Debug, Default)]
pub struct PendingChanges {
    updated: Vec<ItemChangeInfo>,
    created: Vec<ItemChangeInfo>,
    deleted_item_ids: Vec<String>,
}

enum TakeItem {
    Taken(ItemChangeInfo),
    /// The item exists in the pending set but belongs to a different bib.
    BibMismatch(String),
    Absent,
}

impl PendingChanges {
    pub fn new(
        updated: Vec<ItemChangeInfo>,
        created: Vec<ItemChangeInfo>,
        deleted_item_ids: Vec<String>,
    ) -> Self {
        Self {
            updated,
            created,
            deleted_item_ids,
        }
    }

    fn take(items: &mut Vec<ItemChangeInfo>, item_id: &str, bib_id: &str) -> TakeItem {
        let Some(position) = items.iter().position(|item| item.item_id == item_id) else {
            return TakeItem::Absent;
        };
        if items[position].bib_id != bib_id {
            return TakeItem::BibMismatch(items[position].bib_id.clone());
        }
        TakeItem::Taken(items.remove(position))
    }

    fn take_updated(&mut self, item_id: &str, bib_id: &str) -> TakeItem {
        Self::take(&mut self.updated, item_id, bib_id)
    }

    fn take_created(&mut self, item_id: &str, bib_id: &str) -> TakeItem {
        Self::take(&mut self.created, item_id, bib_id)
    }

    fn take_deleted(&mut self, item_id: &str) -> bool {
        match self.deleted_item_ids.iter().position(|id| id == item_id) {
            Some(position) => {
                self.deleted_item_ids.remove(position);
                true
            }
            None => false,
        }
    }

    fn take_updated_for_bib(&mut self, bib_id: &str) -> Vec<ItemChangeInfo> {
        Self::take_for_bib(&mut self.updated, bib_id)
    }

    fn take_created_for_bib(&mut self, bib_id: &str) -> Vec<ItemChangeInfo> {
        Self::take_for_bib(&mut self.created, bib_id)
    }

    fn take_for_bib(items: &mut Vec<ItemChangeInfo>, bib_id: &str) -> Vec<ItemChangeInfo> {
        let mut taken = Vec::new();
        let mut index = 0;
        while index < items.len() {
            if items[index].bib_id == bib_id {
                taken.push(items.remove(index));
            } else {
                index += 1;
            }
        }
        taken
    }

    /// Deleted item ids no holdings field accounted for.
    pub fn remaining_deleted_item_ids(&self) -> &[String] {
        &self.deleted_item_ids
    }
}

/// Synthesizes bib records for one cycle.
///
/// Borrowed collaborators keep this cheap to construct; the orchestrator
/// builds one per cycle.
pub struct BibSynthesizer<'a, T, G, X, L> {
    pub transport: &'a T,
    pub store: &'a RecordStore,
    pub profile: &'a IndexingProfileConfig,
    pub grouper: &'a G,
    pub indexer: &'a X,
    pub log: &'a L,
}

impl<T, G, X, L> BibSynthesizer<'_, T, G, X, L>
where
    T: SoapTransport,
    G: RecordGrouper,
    X: WorkIndexer,
    L: ExtractLog,
{
    /// Fetches and synthesizes the given bibs, batch by batch.
    ///
    /// Returns the number of bibs synthesized. A failed batch or bib is
    /// counted and logged without stopping the rest.
    pub async fn synthesize_bibs(
        &self,
        bib_ids: &[String],
        pending: &mut PendingChanges,
        is_new: bool,
    ) -> usize {
        let mut changes = 0;
        for (batch_index, batch) in batch::batches(bib_ids).enumerate() {
            let request = envelope::marc_records_request(batch);
            let records = match self.transport.post_envelope(&request).await {
                Ok(body) => envelope::parse_marc_records(&body),
                Err(err) => Err(err),
            };
            let records = match records {
                Ok(records) => records,
                Err(err) => {
                    error!(batch_index, batch_size = batch.len(), error = %err, "marc record batch failed");
                    self.log.inc_errors();
                    self.log
                        .add_note(&format!("marc record batch {batch_index} failed: {err}"));
                    continue;
                }
            };
            if records.len() != batch.len() {
                warn!(
                    batch_index,
                    requested = batch.len(),
                    received = records.len(),
                    "record count mismatch in marc record batch"
                );
            }
            for (bib_id, record) in batch.iter().zip(records) {
                match self.synthesize_one(bib_id, record, pending, is_new).await {
                    Ok(()) => {
                        changes += 1;
                        if is_new {
                            self.log.inc_added();
                        } else {
                            self.log.inc_updated();
                        }
                    }
                    Err(err) => {
                        error!(batch_index, bib_id, error = %err, "failed to synthesize bib");
                        self.log.inc_errors();
                        self.log
                            .add_note(&format!("failed to synthesize bib {bib_id}: {err}"));
                    }
                }
            }
            self.log.save_results().await;
        }
        changes
    }

    async fn synthesize_one(
        &self,
        bib_id: &str,
        fresh: Record,
        pending: &mut PendingChanges,
        is_new: bool,
    ) -> ExtractResult<()> {
        let file_id = normalize_record_id(bib_id, &self.profile.record_prefix);
        let mut merged = fresh;

        match self.store.load(&file_id)? {
            Some(prior) => self.merge_prior_holdings(bib_id, &prior, &mut merged, pending),
            None => {
                // Existing holdings are unrecoverable without the stored copy;
                // rebuild what this cycle knows about.
                if !is_new {
                    warn!(bib_id, file_id, "no stored record for updated bib");
                }
                for item in pending.take_updated_for_bib(bib_id) {
                    merged.add_data_field(self.new_holdings_field(&item));
                }
            }
        }
        for item in pending.take_created_for_bib(bib_id) {
            merged.add_data_field(self.new_holdings_field(&item));
        }

        self.store.save(&file_id, &merged)?;
        match self
            .grouper
            .process_record(&self.profile.name, &file_id, &merged, true)
            .await?
        {
            Some(permanent_id) => self.indexer.process_grouped_work(&permanent_id).await?,
            None => debug!(bib_id, "record suppressed from discovery"),
        }
        Ok(())
    }

    fn merge_prior_holdings(
        &self,
        bib_id: &str,
        prior: &Record,
        merged: &mut Record,
        pending: &mut PendingChanges,
    ) {
        for field in prior.data_fields_with_tag(&self.profile.item_tag) {
            let Some(item_id) =
                field.subfield_value(self.profile.item_record_number_subfield)
            else {
                merged.add_data_field(field.clone());
                continue;
            };
            let item_id = item_id.to_string();

            match pending.take_updated(&item_id, bib_id) {
                TakeItem::Taken(item) => {
                    let mut updated = field.clone();
                    apply_item_change(&mut updated, &item, self.profile);
                    merged.add_data_field(updated);
                    continue;
                }
                TakeItem::BibMismatch(owner) => {
                    // The item moved; its new owner applies the change.
                    debug!(bib_id, item_id, owner, "pending item owned by another bib, keeping field");
                    merged.add_data_field(field.clone());
                    continue;
                }
                TakeItem::Absent => {}
            }

            if pending.take_deleted(&item_id) {
                debug!(bib_id, item_id, "dropping holdings field for deleted item");
                continue;
            }

            match pending.take_created(&item_id, bib_id) {
                TakeItem::Taken(item) => {
                    let mut updated = field.clone();
                    apply_item_change(&mut updated, &item, self.profile);
                    merged.add_data_field(updated);
                }
                _ => merged.add_data_field(field.clone()),
            }
        }
    }

    fn new_holdings_field(&self, item: &ItemChangeInfo) -> DataField {
        let mut field = DataField::new(&self.profile.item_tag, ' ', ' ');
        apply_item_change(&mut field, item, self.profile);
        field
    }
}
