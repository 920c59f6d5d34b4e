use async_trait::async_trait;

use crate::safety::models::SafetyEvent;
use fleet_common::error::FleetResult;

#[async_trait]
pub trait SafetyEventRepository: Send + Sync {
    /// Insert or update keyed by `external_id`.
    /// On conflict, derived fields and the raw payload are replaced; `id` and
    /// `first_synced_at` keep their original values.
    async fn upsert_event(&self, event: &SafetyEvent) -> FleetResult<()>;

    async fn get_by_external_id(&self, external_id: &str) -> FleetResult<Option<SafetyEvent>>;

    async fn count_events(&self) -> FleetResult<i64>;
}
