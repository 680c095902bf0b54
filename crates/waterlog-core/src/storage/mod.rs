mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, LoggingConfig, RemoteConfig, RetryPolicy, SyncConfig};
pub use database::ActivityDb;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/waterlog[-dev]/` based on WATERLOG_ENV.
///
/// Set WATERLOG_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("WATERLOG_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("waterlog-dev")
    } else {
        base_dir.join("waterlog")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
