use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::sync::models::{SyncRun, SyncWatermark};
use fleet_common::error::FleetResult;

#[async_trait]
pub trait SyncWatermarkRepository: Send + Sync {
    /// Get or create the watermark for a source.
    async fn get_or_create(&self, source: &str) -> FleetResult<SyncWatermark>;

    /// Atomically set status to 'running' unless another run holds it.
    /// A 'running' row untouched for longer than `stale_after` is taken over.
    /// Returns `None` if the lock is held.
    async fn acquire_lock(
        &self,
        source: &str,
        stale_after: Duration,
    ) -> FleetResult<Option<SyncWatermark>>;

    /// Refresh `updated_at` on a running lock so a long run is not
    /// mistaken for a crashed one.
    async fn touch(&self, id: Uuid) -> FleetResult<()>;

    /// Mark a sync as completed, updating last_synced_at and the cursor.
    async fn mark_completed(
        &self,
        id: Uuid,
        cursor_value: Option<&str>,
    ) -> FleetResult<SyncWatermark>;

    /// Mark a sync as failed with an error message. The cursor is kept.
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> FleetResult<SyncWatermark>;

    /// Append a row to the run log.
    async fn record_run(&self, run: &SyncRun) -> FleetResult<()>;
}
