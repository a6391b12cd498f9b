//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Apply `NOMAD_EVENTS_SINK_*` environment overrides
//! - Validate configuration legality
//! - Generate `AppConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("Data dir: {}", config.app.data_dir.display());
//! ```

mod env;
mod parser;
mod validator;

pub use contracts::AppConfig;
pub use env::ENV_PREFIX;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path, applying process environment overrides
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<AppConfig, ContractError> {
        Self::load_from_path_with_env(path, std::env::vars())
    }

    /// Load configuration from file path with an explicit environment
    pub fn load_from_path_with_env<I>(path: &Path, vars: I) -> Result<AppConfig, ContractError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str_with_env(&content, format, vars)
    }

    /// Load configuration from string, without environment overrides
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<AppConfig, ContractError> {
        Self::load_from_str_with_env(content, format, std::iter::empty())
    }

    /// Load configuration from string with an explicit environment
    pub fn load_from_str_with_env<I>(
        content: &str,
        format: ConfigFormat,
        vars: I,
    ) -> Result<AppConfig, ContractError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = parser::parse(content, format)?;
        env::apply_overrides(&mut table, vars, ENV_PREFIX)?;
        let config = parser::into_config(table)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Validate an already-built configuration
    pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize AppConfig to TOML string
    pub fn to_toml(config: &AppConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize AppConfig to JSON string
    pub fn to_json(config: &AppConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const FULL_TOML: &str = r#"
[app]
data_dir = "./data"
commit_index_interval = "10s"

[stream]
topics = ["deployment", "Job:web"]
max_reconnect_attempts = 5
initial_position = "earliest"

[sinks.batch]
events_count = 50
idle_timeout = "3s"

[[sinks.providers]]
name = "log"
provider_type = "log"

[[sinks.providers]]
name = "loki"
provider_type = "http"
[sinks.providers.params]
root_url = "http://localhost:3100"
external_labels = '{env="dev"}'
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(FULL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.app.commit_index_interval, Duration::from_secs(10));
        assert_eq!(config.stream.max_reconnect_attempts, 5);
        assert_eq!(config.sinks.providers.len(), 2);
        assert_eq!(config.sinks.providers[1].params["root_url"], "http://localhost:3100");
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(FULL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let back = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(back.sinks.batch.idle_timeout, config.sinks.batch.idle_timeout);
        assert_eq!(back.stream.topics, config.stream.topics);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(FULL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let back = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(back.app.data_dir, config.app.data_dir);
    }

    #[test]
    fn test_env_override_applied_before_validation() {
        let env = vec![(
            "NOMAD_EVENTS_SINK_SINKS__BATCH__EVENTS_COUNT".to_string(),
            "0".to_string(),
        )];
        let result = ConfigLoader::load_from_str_with_env(FULL_TOML, ConfigFormat::Toml, env);
        assert!(result.is_err());

        let env = vec![(
            "NOMAD_EVENTS_SINK_SINKS__BATCH__EVENTS_COUNT".to_string(),
            "7".to_string(),
        )];
        let config =
            ConfigLoader::load_from_str_with_env(FULL_TOML, ConfigFormat::Toml, env).unwrap();
        assert_eq!(config.sinks.batch.events_count, 7);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(FULL_TOML.as_bytes()).unwrap();

        let config = ConfigLoader::load_from_path_with_env(file.path(), std::iter::empty()).unwrap();
        assert_eq!(config.sinks.batch.events_count, 50);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
