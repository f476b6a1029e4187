//! Datasource: a named connection pool for one backend.

use std::str::FromStr;
use std::time::Duration;

use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;

use polystore_domain::error::{ConfigurationError, ConnectError, PolystoreError};

use crate::config::{DatasourceConfig, DatasourceSettings, Driver};
use crate::error::StorageError;
use crate::executor::Conn;

enum Pool {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
}

/// An opened connection pool, shared by every thread using its stack.
pub struct Datasource {
    name: String,
    driver: Driver,
    url: String,
    close_timeout: Duration,
    pool: Pool,
}

impl std::fmt::Debug for Datasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datasource")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Datasource {
    /// Check `config` and open the datasource it describes.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Configuration`] when options are missing or
    /// invalid, and [`PolystoreError::Connect`] when the initial connection
    /// probe fails.
    pub async fn build(name: &str, config: &DatasourceConfig) -> Result<Self, PolystoreError> {
        let settings = config.resolve(name)?;
        Self::open(settings).await
    }

    /// Open a pool from checked settings and probe it with one connection.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Configuration`] when the URL cannot be
    /// parsed, and [`PolystoreError::Connect`] when the probe fails.
    pub async fn open(settings: DatasourceSettings) -> Result<Self, PolystoreError> {
        let pool = match settings.driver {
            Driver::Sqlite => Pool::Sqlite(open_sqlite(&settings).await?),
            Driver::MySql => Pool::MySql(open_mysql(&settings).await?),
        };

        tracing::info!(
            datasource = %settings.name,
            driver = %settings.driver,
            max_connections = settings.max_connections,
            "datasource opened"
        );

        Ok(Self {
            name: settings.name,
            driver: settings.driver,
            url: settings.url,
            close_timeout: settings.acquire_timeout,
            pool,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Connection URL, without credentials passed as separate options.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of connections currently held by the pool.
    #[must_use]
    pub fn size(&self) -> u32 {
        match &self.pool {
            Pool::Sqlite(pool) => pool.size(),
            Pool::MySql(pool) => pool.size(),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        match &self.pool {
            Pool::Sqlite(pool) => pool.is_closed(),
            Pool::MySql(pool) => pool.is_closed(),
        }
    }

    /// Close the pool, waiting at most the acquire timeout for checked-out
    /// connections to come back. Connections still out after that are
    /// closed when they are released.
    pub async fn close(&self) {
        let closing = async {
            match &self.pool {
                Pool::Sqlite(pool) => pool.close().await,
                Pool::MySql(pool) => pool.close().await,
            }
        };
        if tokio::time::timeout(self.close_timeout, closing).await.is_err() {
            tracing::warn!(
                datasource = %self.name,
                timeout_secs = self.close_timeout.as_secs(),
                "connections still checked out, datasource closed without them"
            );
            return;
        }
        tracing::info!(datasource = %self.name, "datasource closed");
    }

    pub(crate) async fn acquire(&self) -> Result<PooledConn, StorageError> {
        Ok(match &self.pool {
            Pool::Sqlite(pool) => PooledConn::Sqlite(pool.acquire().await?),
            Pool::MySql(pool) => PooledConn::MySql(pool.acquire().await?),
        })
    }

    pub(crate) async fn begin(&self) -> Result<TxConn, StorageError> {
        Ok(match &self.pool {
            Pool::Sqlite(pool) => TxConn::Sqlite(pool.begin().await?),
            Pool::MySql(pool) => TxConn::MySql(pool.begin().await?),
        })
    }
}

async fn open_sqlite(settings: &DatasourceSettings) -> Result<SqlitePool, PolystoreError> {
    let options = SqliteConnectOptions::from_str(&settings.url)
        .map_err(|err| invalid_url(settings, &err))?
        .create_if_missing(true);

    let mut pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout);

    if settings.is_in_memory() {
        // The database lives only as long as its connection. A second
        // connection would wait on shared-cache locks with no timeout.
        if settings.max_connections > 1 {
            tracing::debug!(
                datasource = %settings.name,
                max_connections = settings.max_connections,
                "in-memory sqlite capped at one connection"
            );
        }
        pool = pool
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    if settings.username.is_some() || settings.password.is_some() {
        tracing::debug!(datasource = %settings.name, "sqlite ignores credentials");
    }

    pool.connect_with(options)
        .await
        .map_err(|err| connect_error(settings, err))
}

async fn open_mysql(settings: &DatasourceSettings) -> Result<MySqlPool, PolystoreError> {
    let mut options =
        MySqlConnectOptions::from_str(&settings.url).map_err(|err| invalid_url(settings, &err))?;
    if let Some(username) = &settings.username {
        options = options.username(username);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }

    MySqlPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect_with(options)
        .await
        .map_err(|err| connect_error(settings, err))
}

fn invalid_url(settings: &DatasourceSettings, err: &sqlx::Error) -> PolystoreError {
    ConfigurationError::InvalidOption {
        datasource: settings.name.clone(),
        option: "url",
        reason: err.to_string(),
    }
    .into()
}

fn connect_error(settings: &DatasourceSettings, err: sqlx::Error) -> PolystoreError {
    tracing::error!(datasource = %settings.name, error = %err, "datasource probe failed");
    ConnectError {
        datasource: settings.name.clone(),
        source: Box::new(err),
    }
    .into()
}

/// A connection checked out of a pool, outside any explicit transaction.
pub(crate) enum PooledConn {
    Sqlite(PoolConnection<Sqlite>),
    MySql(PoolConnection<MySql>),
}

impl PooledConn {
    pub(crate) fn conn(&mut self) -> Conn<'_> {
        match self {
            Self::Sqlite(conn) => Conn::Sqlite(&mut **conn),
            Self::MySql(conn) => Conn::MySql(&mut **conn),
        }
    }
}

/// An open database transaction holding one pooled connection.
///
/// Dropping it without calling [`Self::commit`] or [`Self::rollback`] rolls
/// the transaction back when the connection returns to the pool.
pub(crate) enum TxConn {
    Sqlite(Transaction<'static, Sqlite>),
    MySql(Transaction<'static, MySql>),
}

impl TxConn {
    pub(crate) fn conn(&mut self) -> Conn<'_> {
        match self {
            Self::Sqlite(tx) => Conn::Sqlite(&mut **tx),
            Self::MySql(tx) => Conn::MySql(&mut **tx),
        }
    }

    pub(crate) async fn commit(self) -> Result<(), StorageError> {
        match self {
            Self::Sqlite(tx) => tx.commit().await?,
            Self::MySql(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub(crate) async fn rollback(self) -> Result<(), StorageError> {
        match self {
            Self::Sqlite(tx) => tx.rollback().await?,
            Self::MySql(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}
