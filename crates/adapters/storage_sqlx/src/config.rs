//! Configuration records for datasources and stacks.
//!
//! These are plain `serde` records so a composition root can embed them in
//! its own configuration file. They are checked and normalized when a
//! datasource or stack is built, never at parse time, so that a missing
//! option surfaces as a [`ConfigurationError`] naming the datasource.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use polystore_domain::error::ConfigurationError;

const JDBC_PREFIX: &str = "jdbc:";
const H2_PREFIX: &str = "h2:";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Database backend a datasource talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// Embedded `SQLite`, in memory or on disk.
    Sqlite,
    /// Networked `MySQL`.
    MySql,
}

impl Driver {
    /// Resolve a driver key. JDBC-style class names are accepted, and the
    /// embedded H2 keys map to the embedded `SQLite` backend.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "org.sqlite.jdbc" | "h2" | "org.h2.driver" => Some(Self::Sqlite),
            "mysql" | "com.mysql.jdbc.driver" | "com.mysql.cj.jdbc.driver" => Some(Self::MySql),
            _ => None,
        }
    }

    /// Infer the driver from a connection URL scheme.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        match scheme {
            "sqlite" => Some(Self::Sqlite),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool sizing and timeout hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PoolHints {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Raw datasource options as read from configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DatasourceConfig {
    /// Driver key; inferred from the URL scheme when absent.
    pub driver: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool: PoolHints,
}

impl fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("pool", &self.pool)
            .finish()
    }
}

impl DatasourceConfig {
    /// Shorthand for a datasource reached through `url` with default options.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Check the options and normalize them into [`DatasourceSettings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the URL is missing, the driver is
    /// unknown or disagrees with the URL scheme, or the pool hints are
    /// inconsistent.
    pub fn resolve(&self, name: &str) -> Result<DatasourceSettings, ConfigurationError> {
        let raw_url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigurationError::MissingOption {
                datasource: name.to_string(),
                option: "url",
            })?;
        let url = raw_url.strip_prefix(JDBC_PREFIX).unwrap_or(raw_url);
        let url = match url.strip_prefix(H2_PREFIX) {
            Some(h2) => embedded_h2(name, h2)?,
            None => url.to_string(),
        };
        let url = url.as_str();

        let from_url = Driver::from_url(url);
        let driver = match self.driver.as_deref() {
            Some(key) => {
                let driver =
                    Driver::from_key(key).ok_or_else(|| ConfigurationError::UnsupportedDriver {
                        datasource: name.to_string(),
                        driver: key.to_string(),
                    })?;
                match from_url {
                    Some(inferred) if inferred != driver => {
                        return Err(ConfigurationError::InvalidOption {
                            datasource: name.to_string(),
                            option: "driver",
                            reason: format!("driver {driver} does not match url {url:?}"),
                        });
                    }
                    Some(_) => {}
                    None => {
                        return Err(ConfigurationError::InvalidOption {
                            datasource: name.to_string(),
                            option: "url",
                            reason: format!("unrecognized scheme in {url:?} for driver {driver}"),
                        });
                    }
                }
                driver
            }
            None => from_url.ok_or_else(|| ConfigurationError::UnsupportedDriver {
                datasource: name.to_string(),
                driver: url.split_once(':').map_or(url, |(scheme, _)| scheme).to_string(),
            })?,
        };

        let max_connections = self.pool.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let min_connections = self.pool.min_connections.unwrap_or(0);
        if max_connections == 0 {
            return Err(ConfigurationError::InvalidOption {
                datasource: name.to_string(),
                option: "pool.max-connections",
                reason: "must be at least 1".to_string(),
            });
        }
        if min_connections > max_connections {
            return Err(ConfigurationError::InvalidOption {
                datasource: name.to_string(),
                option: "pool.min-connections",
                reason: format!("{min_connections} exceeds max-connections {max_connections}"),
            });
        }

        Ok(DatasourceSettings {
            name: name.to_string(),
            driver,
            url: url.to_string(),
            username: self.username.clone().filter(|value| !value.is_empty()),
            password: self.password.clone(),
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_secs(
                self.pool
                    .acquire_timeout_secs
                    .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            ),
            idle_timeout: self.pool.idle_timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Map an embedded H2 location onto `SQLite`: `mem:<name>` becomes a private
/// in-memory database and `file:<path>` a database file. H2 settings after
/// `;` are dropped.
fn embedded_h2(name: &str, location: &str) -> Result<String, ConfigurationError> {
    let location = location.split_once(';').map_or(location, |(head, _)| head);
    if location.starts_with("mem:") {
        return Ok("sqlite::memory:".to_string());
    }
    match location.strip_prefix("file:") {
        Some(path) if !path.is_empty() => Ok(format!("sqlite:{path}")),
        _ => Err(ConfigurationError::InvalidOption {
            datasource: name.to_string(),
            option: "url",
            reason: format!("h2:{location} is not an embedded mem: or file: database"),
        }),
    }
}

/// Checked datasource options, ready to open a pool.
#[derive(Clone)]
pub struct DatasourceSettings {
    pub name: String,
    pub driver: Driver,
    /// Connection URL without any `jdbc:` prefix.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl DatasourceSettings {
    /// Whether the URL designates an in-memory `SQLite` database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.driver == Driver::Sqlite
            && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }
}

impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish_non_exhaustive()
    }
}

/// What a persistence unit does with its tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaAction {
    /// Create missing tables when the unit is built.
    #[default]
    Create,
    /// Create missing tables, and drop them again at shutdown.
    CreateDrop,
    /// Leave the schema alone.
    #[serde(rename = "none")]
    Ignore,
}

/// One configuration section: everything needed to materialize a stack.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StackConfig {
    /// Marks the stack returned by unnamed lookups.
    pub primary: bool,
    /// Defaults to the section name.
    pub datasource_name: Option<String>,
    /// Defaults to `<section>Unit`.
    pub unit_name: Option<String>,
    /// Defaults to `<section>TransactionManager`.
    pub coordinator_name: Option<String>,
    /// Entity namespace; defaults to `<section>::entity`.
    pub entities: Option<String>,
    /// Repository namespaces; defaults to `[<section>::repository]`.
    pub repositories: Vec<String>,
    pub schema: SchemaAction,
    #[serde(flatten)]
    pub datasource: DatasourceConfig,
}
