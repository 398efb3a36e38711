//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted registry timeout (10 minutes).
const MAX_TIMEOUT_SECS: u64 = 600;

/// Validate a merged, deserialized configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::ValidationError`] found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_registry(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message,
    }
}

fn validate_registry(config: &Config) -> ConfigResult<()> {
    let r = &config.registry;
    let url = r.url.trim();
    if url.is_empty() {
        return Err(invalid("registry.url", "must not be empty".to_owned()));
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(invalid(
            "registry.url",
            format!("'{url}' is not an http(s) URL"),
        ));
    }
    if r.timeout_secs == 0 || r.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            "registry.timeout_secs",
            format!(
                "{} is out of range; must be between 1 and {MAX_TIMEOUT_SECS}",
                r.timeout_secs
            ),
        ));
    }
    if r.max_download_bytes == 0 {
        return Err(invalid(
            "registry.max_download_bytes",
            "must be greater than 0".to_owned(),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }
    Ok(())
}
