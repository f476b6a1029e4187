//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `polystore.toml` in the working directory, or the file named by
//! `POLYSTORE_CONFIG`. The file is optional: without it the daemon serves the
//! built-in `library` and `accounts` stacks. Environment variables take
//! precedence over file values.

use std::collections::BTreeMap;

use polystore_adapter_storage_sqlx::{DatasourceConfig, StackConfig};
use serde::Deserialize;

const DEFAULT_PATH: &str = "polystore.toml";

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// One section per persistence stack, keyed by stack name.
    pub datasource: BTreeMap<String, StackConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if no
    /// stack is left after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("POLYSTORE_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("POLYSTORE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        for (name, stack) in &mut self.datasource {
            let prefix = format!("POLYSTORE_DATASOURCE_{}", env_key(name));
            let datasource = &mut stack.datasource;
            if let Some(val) = lookup(&format!("{prefix}_URL")) {
                datasource.url = Some(val);
            }
            if let Some(val) = lookup(&format!("{prefix}_USERNAME")) {
                datasource.username = Some(val);
            }
            if let Some(val) = lookup(&format!("{prefix}_PASSWORD")) {
                datasource.password = Some(val);
            }
            if let Some(val) = lookup(&format!("{prefix}_DRIVER")) {
                datasource.driver = Some(val);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.datasource.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [datasource.<name>] section is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// `accounts-db` becomes `ACCOUNTS_DB`.
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        let mut datasource = BTreeMap::new();
        datasource.insert(
            "library".to_string(),
            StackConfig {
                primary: true,
                datasource: DatasourceConfig::from_url("sqlite::memory:"),
                ..StackConfig::default()
            },
        );
        datasource.insert(
            "accounts".to_string(),
            StackConfig {
                datasource: DatasourceConfig {
                    username: Some("root".to_string()),
                    ..DatasourceConfig::from_url("mysql://localhost:3306/accounts")
                },
                ..StackConfig::default()
            },
        );
        Self {
            logging: LoggingConfig::default(),
            datasource,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "polystored=info,polystore_adapter_storage_sqlx=info,polystore_app=info"
                .to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use polystore_adapter_storage_sqlx::SchemaAction;

    use super::*;

    #[test]
    fn should_produce_library_and_accounts_by_default() {
        let config = Config::default();
        assert_eq!(config.datasource.len(), 2);
        assert!(config.datasource["library"].primary);
        assert!(!config.datasource["accounts"].primary);
        assert_eq!(
            config.datasource["library"].datasource.url.as_deref(),
            Some("sqlite::memory:")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_keep_defaults_for_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.datasource.len(), 2);
        assert!(config.logging.filter.contains("polystored=info"));
    }

    #[test]
    fn should_replace_default_stacks_when_file_declares_some() {
        let toml = "
            [logging]
            filter = 'debug'

            [datasource.catalog]
            primary = true
            driver = 'org.h2.Driver'
            url = 'jdbc:sqlite::memory:'
            entities = 'library::entity'
            repositories = ['library::repository']
            unit-name = 'catalogUnit'
            schema = 'create-drop'

            [datasource.catalog.pool]
            max-connections = 4
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.datasource.len(), 1);

        let stack = &config.datasource["catalog"];
        assert!(stack.primary);
        assert_eq!(stack.datasource.driver.as_deref(), Some("org.h2.Driver"));
        assert_eq!(stack.entities.as_deref(), Some("library::entity"));
        assert_eq!(stack.unit_name.as_deref(), Some("catalogUnit"));
        assert_eq!(stack.schema, SchemaAction::CreateDrop);
        assert_eq!(stack.datasource.pool.max_connections, Some(4));
    }

    #[test]
    fn should_override_datasource_options_from_environment() {
        let env = HashMap::from([
            ("RUST_LOG", "trace"),
            ("POLYSTORE_DATASOURCE_ACCOUNTS_URL", "mysql://db:3306/accounts"),
            ("POLYSTORE_DATASOURCE_ACCOUNTS_PASSWORD", "secret"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.logging.filter, "trace");
        let accounts = &config.datasource["accounts"].datasource;
        assert_eq!(accounts.url.as_deref(), Some("mysql://db:3306/accounts"));
        assert_eq!(accounts.password.as_deref(), Some("secret"));
        assert_eq!(accounts.username.as_deref(), Some("root"));
        assert_eq!(
            config.datasource["library"].datasource.url.as_deref(),
            Some("sqlite::memory:")
        );
    }

    #[test]
    fn should_prefer_rust_log_over_polystore_log() {
        let env = HashMap::from([("POLYSTORE_LOG", "warn"), ("RUST_LOG", "debug")]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_derive_env_key_from_stack_name() {
        assert_eq!(env_key("accounts-db"), "ACCOUNTS_DB");
        assert_eq!(env_key("library"), "LIBRARY");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.datasource.len(), 2);
    }

    #[test]
    fn should_reject_config_without_stacks() {
        let config = Config {
            logging: LoggingConfig::default(),
            datasource: BTreeMap::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
