//! # Observability Configuration
//!
//! Environment-specific configuration for logging and metrics.

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// Log level for this crate
    pub log_level: String,
    /// Explicit log format; `None` picks pretty in development and JSON elsewhere
    pub log_format: Option<LogFormat>,
    /// Whether to install the Prometheus recorder
    pub enable_metrics_export: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: None,
            enable_metrics_export: true,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration through an arbitrary key lookup
    ///
    /// Reads `ENVIRONMENT`, `LOG_LEVEL`, `LOG_FORMAT` and `ENABLE_METRICS_EXPORT`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(environment) = lookup("ENVIRONMENT") {
            config.environment = environment;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = Some(LogFormat::parse(&format).ok_or_else(|| {
                format!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", format)
            })?);
        }
        if let Some(export) = lookup("ENABLE_METRICS_EXPORT") {
            config.enable_metrics_export = export.trim().eq_ignore_ascii_case("true");
        }
        Ok(config)
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Format actually used by the subscriber
    pub fn effective_log_format(&self) -> LogFormat {
        match self.log_format {
            Some(format) => format,
            None if self.is_development() => LogFormat::Pretty,
            None => LogFormat::Json,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.environment.trim().is_empty() {
            return Err("Environment name must not be empty".to_string());
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!("Invalid log level: {}", self.log_level));
        }

        Ok(())
    }
}

/// Environment-specific configuration presets
pub mod presets {
    use super::{LogFormat, ObservabilityConfig};

    /// Development configuration with verbose pretty logs
    pub fn development() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "development".to_string(),
            log_level: "debug".to_string(),
            log_format: Some(LogFormat::Pretty),
            ..Default::default()
        }
    }

    /// Production configuration with JSON logs
    pub fn production() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "production".to_string(),
            log_level: "info".to_string(),
            log_format: Some(LogFormat::Json),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.log_level, "info");
        assert!(config.enable_metrics_export);
        assert_eq!(config.effective_log_format(), LogFormat::Pretty);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ObservabilityConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.environment = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_selection() {
        let mut config = presets::production();
        assert_eq!(config.effective_log_format(), LogFormat::Json);

        config.log_format = None;
        assert!(config.is_production());
        assert_eq!(config.effective_log_format(), LogFormat::Json);

        config.log_format = LogFormat::parse("Pretty");
        assert_eq!(config.effective_log_format(), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_from_lookup() {
        let config = ObservabilityConfig::from_lookup(|key| match key {
            "ENVIRONMENT" => Some("staging".to_string()),
            "LOG_FORMAT" => Some("json".to_string()),
            "ENABLE_METRICS_EXPORT" => Some("false".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, Some(LogFormat::Json));
        assert!(!config.enable_metrics_export);

        assert!(ObservabilityConfig::from_lookup(|key| {
            (key == "LOG_FORMAT").then(|| "xml".to_string())
        })
        .is_err());
    }
}
