use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use fleet_common::error::{FleetError, FleetResult};
use fleet_config::env::{get_var, parse_var_or, process_env, Lookup};

use super::models::SafetyEventsPage;
use super::window::{format_cursor, SyncWindow};

const EVENTS_PATH: &str = "/v1/safety/events";
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct SafetyApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub sync_window_days: u32,
    pub lookback_hours: u32,
    pub lock_stale_minutes: u32,
}

impl SafetyApiConfig {
    /// Load the provider config from the process environment.
    pub fn from_env() -> FleetResult<Self> {
        Self::from_lookup(&process_env)
    }

    /// Base URL and API key are required; everything else has a default.
    /// Set-but-invalid values fail fast.
    pub fn from_lookup(lookup: Lookup<'_>) -> FleetResult<Self> {
        let base_url = get_var(lookup, "SAFETY_API_BASE_URL")?
            .trim()
            .trim_end_matches('/')
            .to_string();
        let api_key = get_var(lookup, "SAFETY_API_KEY")?;

        let page_size = parse_var_or(lookup, "SAFETY_PAGE_SIZE", 100)?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(FleetError::Config(format!(
                "SAFETY_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        let max_pages = parse_var_or(lookup, "SAFETY_MAX_PAGES", 500)?;
        if max_pages == 0 {
            return Err(FleetError::Config(
                "SAFETY_MAX_PAGES must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_key,
            page_size,
            max_pages,
            max_retries: parse_var_or(lookup, "SAFETY_MAX_RETRIES", 3)?,
            timeout_secs: parse_var_or(lookup, "SAFETY_TIMEOUT_SECS", 30)?,
            sync_window_days: parse_var_or(lookup, "SAFETY_SYNC_WINDOW_DAYS", 7)?,
            lookback_hours: parse_var_or(lookup, "SAFETY_LOOKBACK_HOURS", 24)?,
            lock_stale_minutes: parse_var_or(lookup, "SAFETY_LOCK_STALE_MINUTES", 60)?,
        })
    }
}

/// One page of raw records and where to continue, if anywhere.
#[derive(Debug)]
pub struct FetchedPage {
    pub events: Vec<Value>,
    pub next_page: Option<u32>,
}

#[derive(Clone)]
pub struct SafetyApiClient {
    client: Client,
    config: SafetyApiConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum SafetyApiError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl SafetyApiClient {
    pub fn new(config: SafetyApiConfig) -> Result<Self, SafetyApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SafetyApiConfig {
        &self.config
    }

    /// Fetch one page of events in `window`, retrying transient errors.
    ///
    /// `next_page` is `None` after a short page, on the last page reported
    /// by `totalPages`, or once `max_pages` is reached.
    pub async fn fetch_page(
        &self,
        window: &SyncWindow,
        page: u32,
    ) -> Result<FetchedPage, SafetyApiError> {
        let page_size = self.config.page_size;
        let query = [
            ("from", format_cursor(window.from)),
            ("to", format_cursor(window.to)),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let body = self.request_with_retry(&query).await?;
        let events_in_page = body.events.len();
        tracing::debug!(page, events_in_page, "fetched safety events page");

        let last = events_in_page < page_size as usize
            || body.total_pages.is_some_and(|total| page >= total);
        let next_page = if last {
            None
        } else if page >= self.config.max_pages {
            tracing::warn!(
                max_pages = self.config.max_pages,
                "page limit reached, remaining events left for the next run"
            );
            None
        } else {
            Some(page + 1)
        };

        Ok(FetchedPage {
            events: body.events,
            next_page,
        })
    }

    async fn request_with_retry(
        &self,
        query: &[(&str, String)],
    ) -> Result<SafetyEventsPage, SafetyApiError> {
        let url = format!("{}{}", self.config.base_url, EVENTS_PATH);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt.min(5), 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .query(query)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(SafetyApiError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                let body = response.text().await?;
                return serde_json::from_str::<SafetyEventsPage>(&body)
                    .map_err(|e| SafetyApiError::Decode(e.to_string()));
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Retry on 5xx
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on 4xx (auth failures included)
            let body = response.text().await.unwrap_or_default();
            return Err(SafetyApiError::HttpError { status, body });
        }

        Err(SafetyApiError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use wiremock::matchers::{bearer_token, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> SafetyApiConfig {
        SafetyApiConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            page_size: 50,
            max_pages: 10,
            max_retries: 2,
            timeout_secs: 5,
            sync_window_days: 7,
            lookback_hours: 24,
            lock_stale_minutes: 60,
        }
    }

    fn test_window() -> SyncWindow {
        SyncWindow {
            from: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap(),
        }
    }

    fn make_events(count: usize, offset: usize) -> Vec<Value> {
        (0..count)
            .map(|i| {
                serde_json::json!({
                    "eventId": format!("EV-{}", i + offset),
                    "statusId": 1,
                    "recordDate": "2026-03-02T14:05:00Z"
                })
            })
            .collect()
    }

    async fn fetch_all(
        client: &SafetyApiClient,
        window: &SyncWindow,
    ) -> Result<Vec<Value>, SafetyApiError> {
        let mut events = Vec::new();
        let mut page = 1;
        loop {
            let fetched = client.fetch_page(window, page).await?;
            events.extend(fetched.events);
            match fetched.next_page {
                Some(next) => page = next,
                None => return Ok(events),
            }
        }
    }

    fn page_body(events: Vec<Value>, page: u32, total_pages: Option<u32>) -> Value {
        serde_json::json!({
            "events": events,
            "page": page,
            "pageSize": 50,
            "totalPages": total_pages
        })
    }

    #[tokio::test]
    async fn fetch_single_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .and(query_param("page", "1"))
            .and(query_param("pageSize", "50"))
            .and(query_param("from", "2026-03-01T00:00:00Z"))
            .and(query_param("to", "2026-03-08T00:00:00Z"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(3, 0), 1, None)),
            )
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["eventId"], "EV-0");
    }

    #[tokio::test]
    async fn fetch_multiple_pages() {
        let server = MockServer::start().await;

        // Page 1: full page → triggers next
        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(50, 0), 1, None)),
            )
            .mount(&server)
            .await;

        // Page 2: partial → last page
        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(10, 50), 2, None)),
            )
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert_eq!(events.len(), 60);
        assert_eq!(events[50]["eventId"], "EV-50");
    }

    #[tokio::test]
    async fn stops_at_total_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(50, 0), 1, Some(1))),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(vec![], 2, Some(1))))
            .expect(0)
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert_eq!(events.len(), 50);
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(50, 0), 1, None)),
            )
            .expect(3)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.max_pages = 3;
        let client = SafetyApiClient::new(config).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert_eq!(events.len(), 150);
    }

    #[tokio::test]
    async fn retries_on_500() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(2, 0), 1, None)),
            )
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn retries_on_429_with_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(make_events(1, 0), 1, None)),
            )
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn fails_fast_on_401() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let err = fetch_all(&client, &test_window()).await.unwrap_err();
        match err {
            SafetyApiError::HttpError { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected HttpError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_retries_exceeded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(ResponseTemplate::new(503).set_body_string("always failing"))
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.max_retries = 1;
        let client = SafetyApiClient::new(config).unwrap();

        let err = fetch_all(&client, &test_window()).await.unwrap_err();
        match err {
            SafetyApiError::MaxRetriesExceeded { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected MaxRetriesExceeded, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let err = fetch_all(&client, &test_window()).await.unwrap_err();
        assert!(matches!(err, SafetyApiError::Decode(_)));
    }

    #[tokio::test]
    async fn sends_bearer_api_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/safety/events"))
            .and(bearer_token("test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(vec![], 1, None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = SafetyApiClient::new(test_config(&server.uri())).unwrap();
        let events = fetch_all(&client, &test_window()).await.unwrap();
        assert!(events.is_empty());
    }

    // ── Config tests ─────────────────────────────────────────────

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_defaults() {
        let lookup = lookup_from(&[
            ("SAFETY_API_BASE_URL", "https://api.telematics.example/ "),
            ("SAFETY_API_KEY", "secret"),
        ]);
        let cfg = SafetyApiConfig::from_lookup(&lookup).unwrap();
        assert_eq!(cfg.base_url, "https://api.telematics.example");
        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.max_pages, 500);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.sync_window_days, 7);
        assert_eq!(cfg.lookback_hours, 24);
        assert_eq!(cfg.lock_stale_minutes, 60);
    }

    #[test]
    fn config_requires_api_key() {
        let lookup = lookup_from(&[("SAFETY_API_BASE_URL", "https://api.telematics.example")]);
        let err = SafetyApiConfig::from_lookup(&lookup).unwrap_err();
        assert!(err.to_string().contains("SAFETY_API_KEY"), "got: {err}");
    }

    #[test]
    fn config_rejects_out_of_range_page_size() {
        for raw in ["0", "5000"] {
            let lookup = lookup_from(&[
                ("SAFETY_API_BASE_URL", "https://api.telematics.example"),
                ("SAFETY_API_KEY", "secret"),
                ("SAFETY_PAGE_SIZE", raw),
            ]);
            let err = SafetyApiConfig::from_lookup(&lookup).unwrap_err();
            assert!(err.to_string().contains("SAFETY_PAGE_SIZE"), "got: {err}");
        }
    }

    #[test]
    fn config_rejects_malformed_numbers() {
        let lookup = lookup_from(&[
            ("SAFETY_API_BASE_URL", "https://api.telematics.example"),
            ("SAFETY_API_KEY", "secret"),
            ("SAFETY_LOOKBACK_HOURS", "a day"),
        ]);
        let err = SafetyApiConfig::from_lookup(&lookup).unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
    }
}
