use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One page of `GET /v1/safety/events`.
///
/// Records stay as raw JSON here so a single malformed record is rejected
/// during transform instead of failing the whole page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyEventsPage {
    #[serde(default)]
    pub events: Vec<Value>,
    pub total_pages: Option<u32>,
}

/// A safety event record from the telematics provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSafetyEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub event_id: String,
    #[serde(default, deserialize_with = "lenient_code")]
    pub status_id: Option<i64>,
    pub record_date: Option<String>,
    pub driver: Option<ApiRef>,
    pub vehicle: Option<ApiRef>,
    pub group_name: Option<String>,
    pub score: Option<i32>,
    pub trigger: Option<ApiNamed>,
    #[serde(default)]
    pub behaviors: Vec<ApiNamed>,
}

/// Driver or vehicle reference embedded in an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRef {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiNamed {
    pub name: Option<String>,
}

/// Read the event id straight off a raw record, without a full parse.
pub fn external_id_of(raw: &Value) -> Option<String> {
    let id = match raw.get("eventId")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Status codes occasionally arrive as strings. Anything that is not an
/// integer becomes `None`, which maps to the `Unknown` label.
fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
