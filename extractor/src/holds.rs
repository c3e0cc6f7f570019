//! Holds summary aggregation.
//!
//! Mirrors active hold counts from the ILS transaction views into the
//! discovery database's `ils_hold_summary` table. The rebuild is all or
//! nothing: readers either see the previous summary or the new one, never a
//! half-truncated table.

use std::future::Future;

use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::{ErrorKind, ExtractResult};
use crate::extract_error;
use crate::store::records::normalize_record_id;

/// Active hold count for one bib.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldsSummaryEntry {
    pub bib_id: String,
    pub hold_count: i64,
}

/// Source of aggregated hold counts.
pub trait HoldsSource {
    /// Current hold counts per bib, ids normalized, ordered by bib id.
    fn active_hold_counts(
        &self,
    ) -> impl Future<Output = ExtractResult<Vec<HoldsSummaryEntry>>> + Send;
}

/// Destination for the rebuilt holds summary. Must replace the previous
/// contents atomically.
pub trait HoldsSink {
    fn replace_all(
        &self,
        entries: &[HoldsSummaryEntry],
    ) -> impl Future<Output = ExtractResult<()>> + Send;
}

/// Rebuilds the holds summary, returning the number of bibs with holds.
pub async fn export_holds<S, K>(source: &S, sink: &K) -> ExtractResult<usize>
where
    S: HoldsSource,
    K: HoldsSink,
{
    let entries = source.active_hold_counts().await?;
    sink.replace_all(&entries).await?;
    info!(bibs = entries.len(), "holds summary rebuilt");
    Ok(entries.len())
}

/// Reads hold counts from the ILS reporting database.
///
/// Bib-level holds are counted directly; item-level holds count only active
/// request transactions and are attributed to the owning bib.
#[derive(Debug, Clone)]
pub struct PgHoldsSource {
    pool: PgPool,
    record_prefix: String,
}

impl PgHoldsSource {
    pub fn new(pool: PgPool, record_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            record_prefix: record_prefix.into(),
        }
    }
}

impl HoldsSource for PgHoldsSource {
    async fn active_hold_counts(&self) -> ExtractResult<Vec<HoldsSummaryEntry>> {
        let rows = sqlx::query(
            "select cast(bid as text) as bib_id, cast(sum(holds) as bigint) as hold_count from ( \
               select bid, count(1) as holds from transbid_v group by bid \
               union all \
               select item_v.bid, count(1) as holds from transitem_v \
                 join item_v on transitem_v.item = item_v.item \
                 where transitem_v.transcode like 'R%' group by item_v.bid \
             ) as holds_by_bid group by bid order by bid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| {
            extract_error!(ErrorKind::HoldsRebuildFailed, "failed to read hold counts", source: err)
        })?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let bib_id: String = row.try_get("bib_id")?;
            entries.push(HoldsSummaryEntry {
                bib_id: normalize_record_id(&bib_id, &self.record_prefix),
                hold_count: row.try_get("hold_count")?,
            });
        }
        Ok(entries)
    }
}

/// Replaces the `ils_hold_summary` table inside a single transaction.
#[derive(Debug, Clone)]
pub struct PgHoldsSink {
    pool: PgPool,
}

impl PgHoldsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl HoldsSink for PgHoldsSink {
    async fn replace_all(&self, entries: &[HoldsSummaryEntry]) -> ExtractResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|err| {
            extract_error!(
                ErrorKind::HoldsRebuildFailed,
                "failed to begin holds rebuild",
                source: err
            )
        })?;

        sqlx::query("truncate table ils_hold_summary")
            .execute(&mut *transaction)
            .await
            .map_err(|err| {
                extract_error!(
                    ErrorKind::HoldsRebuildFailed,
                    "failed to truncate holds summary",
                    source: err
                )
            })?;

        for entry in entries {
            sqlx::query("insert into ils_hold_summary (ils_id, num_holds) values ($1, $2)")
                .bind(&entry.bib_id)
                .bind(entry.hold_count)
                .execute(&mut *transaction)
                .await
                .map_err(|err| {
                    extract_error!(
                        ErrorKind::HoldsRebuildFailed,
                        "failed to insert holds summary row",
                        source: err
                    )
                })?;
        }

        // Rollback on drop keeps the previous summary if anything above failed.
        transaction.commit().await.map_err(|err| {
            extract_error!(
                ErrorKind::HoldsRebuildFailed,
                "failed to commit holds rebuild",
                source: err
            )
        })?;
        Ok(())
    }
}

/// In-memory holds sink with failure injection, for tests and memory
/// deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryHoldsSink {
    inner: std::sync::Arc<tokio::sync::Mutex<Vec<HoldsSummaryEntry>>>,
    fail_next: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MemoryHoldsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next replace fail without touching the stored summary.
    pub fn fail_next_replace(&self) {
        self.fail_next
            .store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub async fn entries(&self) -> Vec<HoldsSummaryEntry> {
        self.inner.lock().await.clone()
    }
}

impl HoldsSink for MemoryHoldsSink {
    async fn replace_all(&self, entries: &[HoldsSummaryEntry]) -> ExtractResult<()> {
        if self
            .fail_next
            .swap(false, std::sync::atomic::Ordering::Relaxed)
        {
            return Err(extract_error!(
                ErrorKind::HoldsRebuildFailed,
                "injected holds rebuild failure"
            ));
        }
        *self.inner.lock().await = entries.to_vec();
        Ok(())
    }
}
