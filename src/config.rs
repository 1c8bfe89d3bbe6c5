use serde::Deserialize;

use super::set_firewall::{FwOption, NotifyOption, Result, RuleDefinition, SourceOption};

/// Main configuration structure for the set firewall
///
/// Every section is optional and falls back to its defaults, so an empty
/// file is a valid configuration without rule definitions.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Logger configuration
    #[serde(default)]
    pub log: LoggerConfig,

    /// Firewall binding defaults shared by every rule definition
    #[serde(default)]
    pub firewall: FwOption,

    /// Where source lists are fetched from
    #[serde(default)]
    pub sources: SourceOption,

    /// Mattermost notification endpoint
    #[serde(default)]
    pub notify: NotifyOption,

    /// Rule definitions, processed in the order given
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Logging configuration parameters
#[derive(Debug, Deserialize)]
pub struct LoggerConfig {
    /// Log level, determining which messages are displayed
    ///
    /// Valid values: "off", "error", "warn", "info", "debug", "trace"
    /// Default is "info".
    #[serde(default = "LoggerConfig::default_log_level")]
    pub level: String,

    /// Controls whether to add timestamp to log messages
    #[serde(default)]
    pub timestamp: bool,

    /// Append log output to this file instead of stderr
    #[serde(default)]
    pub file: Option<String>,
}

impl LoggerConfig {
    #[inline]
    fn default_log_level() -> String { "info".to_string() }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LoggerConfig::default_log_level(),
            timestamp: false,
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(filename: &str) -> Result<Config> {
        let config_data = std::fs::read_to_string(filename)?;
        let config: Config = toml::from_str(&config_data)?;
        Ok(config)
    }
}
