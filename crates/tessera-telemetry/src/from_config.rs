//! Conversion from the `[logging]` config section.

use tessera_config::LoggingSection;

use crate::error::TelemetryResult;
use crate::logging::LogConfig;

impl LogConfig {
    /// Build a stderr log config from a `[logging]` section.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TelemetryError::ConfigError`] for an unknown format.
    pub fn from_section(section: &LoggingSection) -> TelemetryResult<Self> {
        let mut config = Self::new(section.level.clone()).with_format(section.format.parse()?);
        config.directives.clone_from(&section.directives);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_from_section() {
        let section = LoggingSection {
            level: "debug".to_owned(),
            format: "json".to_owned(),
            directives: vec!["tessera_runtime=trace".to_owned()],
        };
        let config = LogConfig::from_section(&section).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directives, section.directives);
    }
}
