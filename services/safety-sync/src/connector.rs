use async_trait::async_trait;

use fleet_common::error::FleetError;
use fleet_db::sync::models::RunOutcome;

use crate::telematics::client::SafetyApiError;

/// Summary of one sync pass. `processed` and `failed` are the job's
/// observable result; `skipped` counts in-run duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub source: String,
    pub outcome: RunOutcome,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SyncResult {
    pub fn skipped(source: &str) -> Self {
        Self {
            source: source.to_string(),
            outcome: RunOutcome::Skipped,
            processed: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Errors that abort a run. Per-record problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] SafetyApiError),

    #[error(transparent)]
    Fleet(#[from] FleetError),
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn source_name(&self) -> &str;
    async fn sync(&self) -> Result<SyncResult, SyncError>;
}
