//! Configuration loading

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::Config;

/// Load configuration and fail fast when it does not validate
///
/// File search order: `explicit` (from `--config`), `LIVECAST_CONFIG_PATH`,
/// `./config.yaml`. Environment variables override file values in every case.
/// Runs before logging is initialised, so progress goes to stderr.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config_path = explicit
        .map(str::to_string)
        .or_else(|| std::env::var("LIVECAST_CONFIG_PATH").ok())
        .filter(|p| Path::new(p).exists())
        .or_else(|| Path::new("config.yaml").exists().then(|| "config.yaml".to_string()));

    let config = match &config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config from environment: {e}"))?
        }
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded");
    Ok(config)
}
