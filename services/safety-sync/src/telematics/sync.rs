use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use fleet_db::safety::repositories::SafetyEventRepository;
use fleet_db::sync::models::{RunOutcome, SyncRun, SyncWatermark};
use fleet_db::sync::repositories::SyncWatermarkRepository;

use super::client::SafetyApiClient;
use super::models::external_id_of;
use super::transform::to_safety_event;
use super::window::{advance_cursor, resume_point, SyncWindow};
use crate::connector::{Connector, SyncError, SyncResult};

pub const SOURCE_NAME: &str = "safety_events";

/// Drop repeated event ids, keeping the last occurrence in the position of
/// the first. Records without an id pass through untouched.
fn dedupe_by_external_id(records: Vec<Value>) -> (Vec<Value>, usize) {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Value> = Vec::with_capacity(records.len());
    let mut duplicates = 0;

    for record in records {
        match external_id_of(&record) {
            Some(id) => match positions.get(&id).copied() {
                Some(pos) => {
                    unique[pos] = record;
                    duplicates += 1;
                }
                None => {
                    positions.insert(id, unique.len());
                    unique.push(record);
                }
            },
            None => unique.push(record),
        }
    }

    (unique, duplicates)
}

/// Counters for one locked run, kept outside the run so a failure can
/// still report how far it got.
#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    failed: usize,
    skipped: usize,
}

impl Tally {
    fn result(&self, outcome: RunOutcome) -> SyncResult {
        SyncResult {
            source: SOURCE_NAME.to_string(),
            outcome,
            processed: self.processed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}

pub struct SafetyEventSyncer<E, S> {
    client: SafetyApiClient,
    event_repo: E,
    sync_repo: S,
}

impl<E, S> SafetyEventSyncer<E, S>
where
    E: SafetyEventRepository,
    S: SyncWatermarkRepository,
{
    pub fn new(client: SafetyApiClient, event_repo: E, sync_repo: S) -> Self {
        Self {
            client,
            event_repo,
            sync_repo,
        }
    }

    /// Fetch every page of `window`, refreshing the lock after each one.
    async fn fetch_window(
        &self,
        watermark_id: Uuid,
        window: &SyncWindow,
    ) -> Result<Vec<Value>, SyncError> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let fetched = self.client.fetch_page(window, page).await?;
            records.extend(fetched.events);
            self.sync_repo.touch(watermark_id).await?;
            match fetched.next_page {
                Some(next) => page = next,
                None => return Ok(records),
            }
        }
    }

    /// Everything that happens while the lock is held. Returns the new
    /// checkpoint after it has been written.
    async fn run_locked(
        &self,
        watermark: &SyncWatermark,
        started_at: DateTime<Utc>,
        tally: &mut Tally,
    ) -> Result<Option<String>, SyncError> {
        let config = self.client.config();
        let window = SyncWindow::from_checkpoint(
            watermark.cursor_value.as_deref(),
            started_at,
            config.sync_window_days,
            config.lookback_hours,
        );
        tracing::info!(from = %window.from, to = %window.to, "fetching safety events");

        let records = self.fetch_window(watermark.id, &window).await?;
        let fetched = records.len();
        let (records, duplicates) = dedupe_by_external_id(records);
        tally.skipped = duplicates;
        tracing::info!(fetched, duplicates, "fetched safety events");

        let synced_at = Utc::now();
        let heartbeat_every = config.page_size.max(1) as usize;
        let mut latest_stored: Option<DateTime<Utc>> = None;
        let mut earliest_failed: Option<DateTime<Utc>> = None;

        for (index, raw) in records.iter().enumerate() {
            if index > 0 && index % heartbeat_every == 0 {
                self.sync_repo.touch(watermark.id).await?;
            }

            let event = match to_safety_event(raw, synced_at) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(
                        external_id = external_id_of(raw).as_deref().unwrap_or("<none>"),
                        error = %e,
                        "skipping malformed safety event"
                    );
                    tally.failed += 1;
                    continue;
                }
            };

            match self.event_repo.upsert_event(&event).await {
                Ok(()) => {
                    tally.processed += 1;
                    latest_stored = latest_stored.max(Some(event.event_time));
                }
                Err(e) => {
                    tracing::warn!(
                        external_id = %event.external_id,
                        error = %e,
                        "failed to upsert safety event"
                    );
                    tally.failed += 1;
                    earliest_failed = Some(match earliest_failed {
                        Some(at) => at.min(event.event_time),
                        None => event.event_time,
                    });
                }
            }
        }

        let cursor = advance_cursor(
            watermark.cursor_value.as_deref(),
            resume_point(latest_stored, earliest_failed),
        );
        self.sync_repo
            .mark_completed(watermark.id, cursor.as_deref())
            .await?;

        Ok(cursor)
    }

    /// Release the lock as failed and log the run. The original error is
    /// returned even if the bookkeeping writes fail.
    async fn abort(
        &self,
        watermark_id: Uuid,
        started_at: DateTime<Utc>,
        tally: &Tally,
        error: SyncError,
    ) -> SyncError {
        let msg = error.to_string();
        tracing::error!(error = %msg, "safety event sync failed");

        if let Err(e) = self.sync_repo.mark_failed(watermark_id, &msg).await {
            tracing::warn!(error = %e, "failed to mark sync as failed");
        }
        self.record_run(started_at, &tally.result(RunOutcome::Failed), Some(&msg))
            .await;

        error
    }

    /// Append to the run log. A failed write here is logged, never fatal.
    async fn record_run(
        &self,
        started_at: DateTime<Utc>,
        result: &SyncResult,
        error_message: Option<&str>,
    ) {
        let run = SyncRun {
            id: Uuid::new_v4(),
            source: SOURCE_NAME.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome: result.outcome,
            processed: result.processed as i64,
            failed: result.failed as i64,
            skipped: result.skipped as i64,
            error_message: error_message.map(str::to_string),
        };
        if let Err(e) = self.sync_repo.record_run(&run).await {
            tracing::warn!(error = %e, "failed to record sync run");
        }
    }
}

#[async_trait]
impl<E, S> Connector for SafetyEventSyncer<E, S>
where
    E: SafetyEventRepository,
    S: SyncWatermarkRepository,
{
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn sync(&self) -> Result<SyncResult, SyncError> {
        let started_at = Utc::now();

        // Ensure watermark row exists
        self.sync_repo.get_or_create(SOURCE_NAME).await?;

        let stale_after = Duration::minutes(i64::from(self.client.config().lock_stale_minutes));
        let watermark = match self.sync_repo.acquire_lock(SOURCE_NAME, stale_after).await? {
            Some(wm) => wm,
            None => {
                tracing::info!("safety event sync already running, skipping");
                let result = SyncResult::skipped(SOURCE_NAME);
                self.record_run(started_at, &result, None).await;
                return Ok(result);
            }
        };

        let mut tally = Tally::default();
        let cursor = match self.run_locked(&watermark, started_at, &mut tally).await {
            Ok(cursor) => cursor,
            Err(e) => return Err(self.abort(watermark.id, started_at, &tally, e).await),
        };

        let result = tally.result(RunOutcome::Completed);
        self.record_run(started_at, &result, None).await;

        tracing::info!(
            processed = result.processed,
            failed = result.failed,
            skipped = result.skipped,
            cursor = cursor.as_deref().unwrap_or("<none>"),
            "safety event sync completed"
        );
        Ok(result)
    }
}
