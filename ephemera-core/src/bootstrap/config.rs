//! Configuration loading

use anyhow::{Context, Result};

use crate::Config;

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. EPHEMERA_CONFIG_PATH environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (Kubernetes mount path)
/// 4. Environment variables only
///
/// Environment variables override file values in every case.
///
/// Runs before logging is initialized, so progress goes to stderr.
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var("EPHEMERA_CONFIG_PATH")
        .ok()
        .filter(|p| std::path::Path::new(p).exists())
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| std::path::Path::new(p).exists())
                .map(str::to_string)
        });

    load_and_validate(config_path.as_deref())
}

/// Load from `config_path` (if any) overlaid with environment variables.
///
/// A value that does not parse is an error; the defaults are never used in
/// place of a configuration that failed to load.
fn load_and_validate(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(path).with_context(|| format!("Failed to load config from {path}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().context("Failed to load config from environment variables")?
        }
    };

    // Fail fast on misconfigurations
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

    Ok(config)
}
