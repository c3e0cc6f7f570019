use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::ExtractResult;
use crate::state::SyncWatermark;
use crate::store::state::WatermarkStore;

/// Watermark store backed by the discovery database.
///
/// Timestamps are stored as epoch seconds; zero or NULL both read back as
/// "never", matching rows created before a column was first written.
#[derive(Debug, Clone)]
pub struct PostgresWatermarkStore {
    pool: PgPool,
    profile_name: String,
}

impl PostgresWatermarkStore {
    pub fn new(pool: PgPool, profile_name: impl Into<String>) -> Self {
        Self {
            pool,
            profile_name: profile_name.into(),
        }
    }

    async fn set_column(&self, column: &str, at: DateTime<Utc>) -> ExtractResult<()> {
        // Column names come from a fixed set below, never from input.
        let query = format!("update sync_profiles set {column} = $1 where profile_name = $2");
        sqlx::query(&query)
            .bind(at.timestamp())
            .bind(&self.profile_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn read_instant(row: &PgRow, column: &str) -> ExtractResult<Option<DateTime<Utc>>> {
    let seconds: Option<i64> = row.try_get(column)?;
    Ok(seconds
        .filter(|seconds| *seconds > 0)
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()))
}

impl WatermarkStore for PostgresWatermarkStore {
    async fn load(&self) -> ExtractResult<SyncWatermark> {
        sqlx::query(
            "insert into sync_profiles (profile_name) values ($1) on conflict (profile_name) do nothing",
        )
        .bind(&self.profile_name)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "select last_changed_records, last_full_update, last_bulk_export, run_full_update \
             from sync_profiles where profile_name = $1",
        )
        .bind(&self.profile_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncWatermark {
            last_changed_records: read_instant(&row, "last_changed_records")?,
            last_full_update: read_instant(&row, "last_full_update")?,
            last_bulk_export: read_instant(&row, "last_bulk_export")?,
            run_full_update: row.try_get("run_full_update")?,
        })
    }

    async fn set_last_changed_records(&self, at: DateTime<Utc>) -> ExtractResult<()> {
        self.set_column("last_changed_records", at).await
    }

    async fn set_last_full_update(&self, at: DateTime<Utc>) -> ExtractResult<()> {
        sqlx::query(
            "update sync_profiles set last_full_update = $1, run_full_update = false \
             where profile_name = $2",
        )
        .bind(at.timestamp())
        .bind(&self.profile_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_last_bulk_export(&self, at: DateTime<Utc>) -> ExtractResult<()> {
        self.set_column("last_bulk_export", at).await
    }
}
