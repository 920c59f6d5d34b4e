use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::safety::models::SafetyEvent;
use crate::safety::repositories::SafetyEventRepository;
use fleet_common::error::{FleetError, FleetResult};

#[derive(Clone)]
pub struct PgSafetyEventRepository {
    pool: PgPool,
}

impl PgSafetyEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> SafetyEvent {
        SafetyEvent {
            id: row.get("id"),
            external_id: row.get("external_id"),
            status_code: row.get("status_code"),
            status_label: row.get("status_label"),
            behaviors: row.get("behaviors"),
            event_time: row.get("event_time"),
            driver_external_id: row.get("driver_external_id"),
            driver_name: row.get("driver_name"),
            vehicle_external_id: row.get("vehicle_external_id"),
            vehicle_name: row.get("vehicle_name"),
            group_name: row.get("group_name"),
            score: row.get("score"),
            trigger_name: row.get("trigger_name"),
            raw_payload: row.get("raw_payload"),
            first_synced_at: row.get("first_synced_at"),
            last_synced_at: row.get("last_synced_at"),
        }
    }
}

#[async_trait]
impl SafetyEventRepository for PgSafetyEventRepository {
    async fn upsert_event(&self, event: &SafetyEvent) -> FleetResult<()> {
        sqlx::query(
            "insert into safety_events
             (id, external_id, status_code, status_label, behaviors, event_time,
              driver_external_id, driver_name, vehicle_external_id, vehicle_name,
              group_name, score, trigger_name, raw_payload, first_synced_at, last_synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             on conflict (external_id) do update set
               status_code = excluded.status_code,
               status_label = excluded.status_label,
               behaviors = excluded.behaviors,
               event_time = excluded.event_time,
               driver_external_id = excluded.driver_external_id,
               driver_name = excluded.driver_name,
               vehicle_external_id = excluded.vehicle_external_id,
               vehicle_name = excluded.vehicle_name,
               group_name = excluded.group_name,
               score = excluded.score,
               trigger_name = excluded.trigger_name,
               raw_payload = excluded.raw_payload,
               last_synced_at = excluded.last_synced_at",
        )
        .bind(event.id)
        .bind(&event.external_id)
        .bind(event.status_code)
        .bind(&event.status_label)
        .bind(&event.behaviors)
        .bind(event.event_time)
        .bind(&event.driver_external_id)
        .bind(&event.driver_name)
        .bind(&event.vehicle_external_id)
        .bind(&event.vehicle_name)
        .bind(&event.group_name)
        .bind(event.score)
        .bind(&event.trigger_name)
        .bind(&event.raw_payload)
        .bind(event.first_synced_at)
        .bind(event.last_synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_by_external_id(&self, external_id: &str) -> FleetResult<Option<SafetyEvent>> {
        let row = sqlx::query(
            "select id, external_id, status_code, status_label, behaviors, event_time,
                    driver_external_id, driver_name, vehicle_external_id, vehicle_name,
                    group_name, score, trigger_name, raw_payload, first_synced_at, last_synced_at
             from safety_events
             where external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn count_events(&self) -> FleetResult<i64> {
        let row = sqlx::query("select count(*) as cnt from safety_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FleetError::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("cnt"))
    }
}
