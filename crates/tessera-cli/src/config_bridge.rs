//! Turns the loaded [`Config`] into runtime collaborators.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tessera_config::Config;
use tessera_plugins::{HttpRegistryClient, PluginResult, ScriptLimits};
use tessera_telemetry::{LogConfig, TelemetryResult};

/// The realm directory: the `--realm` flag, then `[realm] path`, then the
/// working directory.
pub(crate) fn realm_root(flag: Option<&Path>, config: &Config) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| config.realm.root())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) fn to_log_config(config: &Config, level_override: Option<&str>) -> TelemetryResult<LogConfig> {
    let mut log = LogConfig::from_section(&config.logging)?;
    if let Some(level) = level_override {
        level.clone_into(&mut log.level);
    }
    Ok(log)
}

pub(crate) fn to_script_limits(config: &Config) -> ScriptLimits {
    ScriptLimits {
        max_operations: config.scripts.max_operations,
        max_call_levels: config.scripts.max_call_levels,
    }
}

pub(crate) fn to_registry_client(config: &Config) -> PluginResult<HttpRegistryClient> {
    let registry = &config.registry;
    Ok(
        HttpRegistryClient::with_base(&registry.url, Duration::from_secs(registry.timeout_secs))?
            .with_max_download(registry.max_download_bytes),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_root_precedence() {
        let mut config = Config::default();
        assert_eq!(realm_root(None, &config), PathBuf::from("."));

        config.realm.path = "/srv/notes".to_owned();
        assert_eq!(realm_root(None, &config), PathBuf::from("/srv/notes"));
        assert_eq!(
            realm_root(Some(Path::new("/tmp/realm")), &config),
            PathBuf::from("/tmp/realm")
        );
    }

    #[test]
    fn test_log_level_override() {
        let config = Config::default();
        let log = to_log_config(&config, Some("trace")).unwrap();
        assert_eq!(log.level, "trace");
        assert_eq!(to_log_config(&config, None).unwrap().level, config.logging.level);
    }

    #[test]
    fn test_limits_and_registry_from_defaults() {
        let config = Config::default();
        assert_eq!(to_script_limits(&config), ScriptLimits::default());
        assert!(to_registry_client(&config).is_ok());
    }
}
