use std::path::Path;

use fleet_common::error::{FleetError, FleetResult};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber with env-based filtering.
///
/// `RUST_LOG` wins over `default_level`. When `log_dir` is given, events are
/// also appended to a daily rolling `<file_prefix>.log` file in that directory.
pub fn init_tracing(
    default_level: &str,
    log_dir: Option<&Path>,
    file_prefix: &str,
) -> FleetResult<()> {
    let filter =
        EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                FleetError::Config(format!("cannot create log dir {}: {e}", dir.display()))
            })?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{file_prefix}.log"));
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(appender),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| FleetError::Internal(format!("failed to initialize tracing: {e}")))
}
