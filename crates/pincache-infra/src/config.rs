//! Configuration loader for pincache.
//!
//! Reads `config.toml` from the data directory (`~/.pincache/` in production)
//! and deserializes it into [`CacheConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed. Environment variables override the
//! backend location.

use std::path::{Path, PathBuf};

use pincache_types::config::CacheConfig;
use pincache_types::error::ConfigError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PINCACHE_DATA_DIR";
/// Environment variable overriding `base_url`.
pub const BASE_URL_ENV: &str = "PINCACHE_BASE_URL";
/// Environment variable overriding `project`.
pub const PROJECT_ENV: &str = "PINCACHE_PROJECT";

/// Resolve the data directory.
///
/// `$PINCACHE_DATA_DIR`, then `~/.pincache`, then `./.pincache`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".pincache");
    }

    PathBuf::from(".pincache")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`CacheConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(data_dir: &Path) -> CacheConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return CacheConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return CacheConfig::default();
        }
    };

    match parse_config(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("{}: {err}, using defaults", config_path.display());
            CacheConfig::default()
        }
    }
}

/// Parse a config document.
pub fn parse_config(content: &str) -> Result<CacheConfig, ConfigError> {
    toml::from_str::<CacheConfig>(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Apply overrides from an environment lookup function.
///
/// Takes a lookup instead of reading `std::env` directly so it can be
/// exercised without mutating the process environment.
pub fn apply_overrides<F>(config: &mut CacheConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        tracing::debug!(base_url = %url, "base_url overridden from environment");
        config.base_url = url.trim().to_string();
    }
    if let Some(project) = lookup(PROJECT_ENV).filter(|v| !v.trim().is_empty()) {
        tracing::debug!(project = %project, "project overridden from environment");
        config.project = project.trim().to_string();
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut CacheConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Load, apply environment overrides, and validate.
pub async fn load_validated_config(data_dir: &Path) -> Result<CacheConfig, ConfigError> {
    let mut config = load_config(data_dir).await;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}
