use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{SyncRun, SyncWatermark, WatermarkStatus};
use crate::sync::repositories::SyncWatermarkRepository;
use fleet_common::error::{FleetError, FleetResult};

#[derive(Clone)]
pub struct PgSyncRepository {
    pool: PgPool,
}

impl PgSyncRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> FleetResult<SyncWatermark> {
        let status_raw: String = row.get("status");
        let status = WatermarkStatus::from_str(&status_raw).map_err(FleetError::Internal)?;

        Ok(SyncWatermark {
            id: row.get("id"),
            source: row.get("source"),
            last_synced_at: row.get("last_synced_at"),
            cursor_value: row.get("cursor_value"),
            status,
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SyncWatermarkRepository for PgSyncRepository {
    async fn get_or_create(&self, source: &str) -> FleetResult<SyncWatermark> {
        let row = sqlx::query(
            "insert into sync_watermarks (id, source)
             values ($1, $2)
             on conflict (source) do update set updated_at = sync_watermarks.updated_at
             returning id, source, last_synced_at, cursor_value, status, error_message, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(source)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn acquire_lock(
        &self,
        source: &str,
        stale_after: Duration,
    ) -> FleetResult<Option<SyncWatermark>> {
        let now = Utc::now();
        let row = sqlx::query(
            "update sync_watermarks
             set status = 'running', error_message = null, updated_at = $1
             where source = $2 and (status != 'running' or updated_at < $3)
             returning id, source, last_synced_at, cursor_value, status, error_message, created_at, updated_at",
        )
        .bind(now)
        .bind(source)
        .bind(now - stale_after)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn touch(&self, id: Uuid) -> FleetResult<()> {
        sqlx::query(
            "update sync_watermarks
             set updated_at = $1
             where id = $2 and status = 'running'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        cursor_value: Option<&str>,
    ) -> FleetResult<SyncWatermark> {
        let now = Utc::now();
        let row = sqlx::query(
            "update sync_watermarks
             set status = 'idle', last_synced_at = $1, cursor_value = $2, error_message = null, updated_at = $1
             where id = $3
             returning id, source, last_synced_at, cursor_value, status, error_message, created_at, updated_at",
        )
        .bind(now)
        .bind(cursor_value)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> FleetResult<SyncWatermark> {
        let row = sqlx::query(
            "update sync_watermarks
             set status = 'failed', error_message = $1, updated_at = $2
             where id = $3
             returning id, source, last_synced_at, cursor_value, status, error_message, created_at, updated_at",
        )
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn record_run(&self, run: &SyncRun) -> FleetResult<()> {
        sqlx::query(
            "insert into sync_runs
             (id, source, started_at, finished_at, outcome, processed, failed, skipped, error_message)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(run.id)
        .bind(&run.source)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.outcome.as_str())
        .bind(run.processed)
        .bind(run.failed)
        .bind(run.skipped)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;
        Ok(())
    }
}
