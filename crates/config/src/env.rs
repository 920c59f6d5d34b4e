use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use fleet_common::error::{FleetError, FleetResult};
use serde::Deserialize;

/// Variable lookup used by every `from_lookup` constructor. Blank values
/// count as unset.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a variable from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub apply_schema: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> FleetResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> FleetResult<Self> {
        Ok(Self {
            database_url: get_var(lookup, "DATABASE_URL")?,
            log_level: get_var_or(lookup, "LOG_LEVEL", "info"),
            log_dir: lookup("LOG_DIR").map(PathBuf::from),
            apply_schema: get_flag(lookup, "SAFETY_SYNC_APPLY_SCHEMA")?,
        })
    }
}

pub fn get_var(lookup: Lookup<'_>, key: &str) -> FleetResult<String> {
    lookup(key).ok_or_else(|| FleetError::Config(format!("{key} is required but not set")))
}

pub fn get_var_or(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

/// Parse an optional variable, falling back to `default` when unset.
/// A value that is set but does not parse is an error.
pub fn parse_var_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> FleetResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FleetError::Config(format!("invalid {key}: {e}"))),
        None => Ok(default),
    }
}

pub fn get_flag(lookup: Lookup<'_>, key: &str) -> FleetResult<bool> {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(FleetError::Config(format!(
            "invalid {key}: expected a boolean, got {other:?}"
        ))),
    }
}
