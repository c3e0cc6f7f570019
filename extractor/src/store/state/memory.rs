use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::ExtractResult;
use crate::state::SyncWatermark;
use crate::store::state::WatermarkStore;

/// In-memory watermark store for tests and transient deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatermarkStore {
    inner: Arc<Mutex<SyncWatermark>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(watermark: SyncWatermark) -> Self {
        Self {
            inner: Arc::new(Mutex::new(watermark)),
        }
    }

    /// Flags the profile for a full update on the next cycle.
    pub async fn request_full_update(&self) {
        self.inner.lock().await.run_full_update = true;
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> ExtractResult<SyncWatermark> {
        Ok(*self.inner.lock().await)
    }

    async fn set_last_changed_records(&self, at: DateTime<Utc>) -> ExtractResult<()> {
        self.inner.lock().await.last_changed_records = Some(at);
        Ok(())
    }

    async fn set_last_full_update(&self, at: DateTime<Utc>) -> ExtractResult<()> {
        let mut inner = self.inner.lock().await;
        inner.last_full_update = Some(at);
        inner.run_full_update = false;
        Ok(())
    }

    async fn set_last_bulk_export(&self, at: DateTime<Utc>) -> ExtractResult<()> {
        self.inner.lock().await.last_bulk_export = Some(at);
        Ok(())
    }
}
