mod connector;
mod telematics;

use std::process::ExitCode;

use fleet_config::{init_tracing, AppConfig};
use fleet_db::safety::pg_repository::PgSafetyEventRepository;
use fleet_db::safety::repositories::SafetyEventRepository;
use fleet_db::sync::models::RunOutcome;
use fleet_db::sync::pg_repository::PgSyncRepository;

use crate::connector::{Connector, SyncError, SyncResult};
use crate::telematics::client::{SafetyApiClient, SafetyApiConfig};
use crate::telematics::sync::SafetyEventSyncer;

const SERVICE_NAME: &str = "safety-sync";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{SERVICE_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.log_level, config.log_dir.as_deref(), SERVICE_NAME) {
        eprintln!("{SERVICE_NAME}: {e}");
        return ExitCode::FAILURE;
    }

    let api_config = match SafetyApiConfig::from_env() {
        Ok(api_config) => api_config,
        Err(e) => {
            tracing::error!(error = %e, "invalid safety api configuration");
            eprintln!("{SERVICE_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        service = SERVICE_NAME,
        base_url = %api_config.base_url,
        page_size = api_config.page_size,
        "starting"
    );

    let outcome = run(&config, api_config).await;
    match &outcome {
        Ok(result) => tracing::info!(
            source = %result.source,
            outcome = result.outcome.as_str(),
            processed = result.processed,
            failed = result.failed,
            skipped = result.skipped,
            "safety sync finished"
        ),
        Err(e) => {
            tracing::error!(error = %e, "safety sync aborted");
            eprintln!("{SERVICE_NAME}: {e}");
        }
    }
    exit_code(&outcome)
}

/// Completed and skipped runs succeed; anything that aborted the run fails.
fn exit_code(outcome: &Result<SyncResult, SyncError>) -> ExitCode {
    match outcome {
        Ok(result) => match result.outcome {
            RunOutcome::Completed | RunOutcome::Skipped => ExitCode::SUCCESS,
            RunOutcome::Failed => ExitCode::FAILURE,
        },
        Err(_) => ExitCode::FAILURE,
    }
}

async fn run(config: &AppConfig, api_config: SafetyApiConfig) -> Result<SyncResult, SyncError> {
    let pool = fleet_db::create_pool(&config.database_url).await?;
    if config.apply_schema {
        fleet_db::apply_schema(&pool).await?;
    }

    let client = SafetyApiClient::new(api_config)?;
    let event_repo = PgSafetyEventRepository::new(pool.clone());
    let sync_repo = PgSyncRepository::new(pool.clone());

    let syncer = SafetyEventSyncer::new(client, event_repo.clone(), sync_repo);
    tracing::info!(source = syncer.source_name(), "starting sync");
    let result = syncer.sync().await?;

    match event_repo.count_events().await {
        Ok(total) => tracing::info!(total, "safety_events row count"),
        Err(e) => tracing::warn!(error = %e, "could not count safety_events"),
    }

    pool.close().await;
    Ok(result)
}
