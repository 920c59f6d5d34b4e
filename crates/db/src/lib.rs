pub mod safety;
pub mod sync;

use fleet_common::error::{FleetError, FleetResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// DDL for every table the sync job writes. Idempotent.
pub const SCHEMA_SQL: &str = include_str!("../schema/safety_sync.sql");

/// Create a Postgres connection pool from a database URL.
///
/// The job issues statements one at a time, so the pool stays small.
pub async fn create_pool(database_url: &str) -> FleetResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))
}

/// Apply [`SCHEMA_SQL`] to the connected database.
pub async fn apply_schema(pool: &PgPool) -> FleetResult<()> {
    tracing::info!("applying safety sync schema");
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(|e| FleetError::Database(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_fails_with_invalid_url() {
        let result = create_pool("postgres://invalid:5432/nonexistent").await;
        assert!(result.is_err());
    }

    #[test]
    fn schema_declares_upsert_keys() {
        assert!(SCHEMA_SQL.contains("on safety_events(external_id)"));
        assert!(SCHEMA_SQL.contains("on sync_watermarks(source)"));
    }
}
