use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `safety_events` row: one per upstream event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub id: Uuid,
    pub external_id: String,
    pub status_code: Option<i64>,
    pub status_label: String,
    pub behaviors: Vec<String>,
    pub event_time: DateTime<Utc>,
    pub driver_external_id: Option<String>,
    pub driver_name: Option<String>,
    pub vehicle_external_id: Option<String>,
    pub vehicle_name: Option<String>,
    pub group_name: Option<String>,
    pub score: Option<i32>,
    pub trigger_name: Option<String>,
    /// Upstream record, verbatim.
    pub raw_payload: serde_json::Value,
    pub first_synced_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}
