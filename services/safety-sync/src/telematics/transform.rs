use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use fleet_db::safety::models::SafetyEvent;

use super::models::ApiSafetyEvent;
use super::status::EventStatus;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("record has no event id")]
    MissingId,

    #[error("event {external_id} has no recordDate")]
    MissingDate { external_id: String },

    #[error("event {external_id} has an invalid recordDate {value:?}")]
    InvalidDate { external_id: String, value: String },
}

/// Convert one raw provider record into a `safety_events` row.
///
/// Deterministic apart from `id`, which the upsert ignores on conflict.
pub fn to_safety_event(raw: &Value, synced_at: DateTime<Utc>) -> Result<SafetyEvent, TransformError> {
    if !raw.is_object() {
        return Err(TransformError::NotAnObject);
    }

    let api = ApiSafetyEvent::deserialize(raw).map_err(|e| TransformError::Malformed(e.to_string()))?;

    let external_id = api.event_id.trim().to_string();
    if external_id.is_empty() {
        return Err(TransformError::MissingId);
    }

    let event_time = match api.record_date.as_deref() {
        Some(value) => parse_event_time(value).ok_or_else(|| TransformError::InvalidDate {
            external_id: external_id.clone(),
            value: value.to_string(),
        })?,
        None => return Err(TransformError::MissingDate { external_id }),
    };

    let status = EventStatus::from_code(api.status_id);

    Ok(SafetyEvent {
        id: Uuid::new_v4(),
        external_id,
        status_code: api.status_id,
        status_label: status.label().to_string(),
        behaviors: behavior_names(&api),
        event_time,
        driver_external_id: api.driver.as_ref().and_then(|d| non_blank(d.id.as_deref())),
        driver_name: api.driver.as_ref().and_then(|d| non_blank(d.name.as_deref())),
        vehicle_external_id: api.vehicle.as_ref().and_then(|v| non_blank(v.id.as_deref())),
        vehicle_name: api.vehicle.as_ref().and_then(|v| non_blank(v.name.as_deref())),
        group_name: non_blank(api.group_name.as_deref()),
        score: api.score,
        trigger_name: api.trigger.as_ref().and_then(|t| non_blank(t.name.as_deref())),
        raw_payload: raw.clone(),
        first_synced_at: synced_at,
        last_synced_at: synced_at,
    })
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` taken as UTC.
fn parse_event_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Behavior names, trimmed and de-duplicated in first-seen order.
fn behavior_names(api: &ApiSafetyEvent) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(api.behaviors.len());
    for name in api.behaviors.iter().filter_map(|b| non_blank(b.name.as_deref())) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
