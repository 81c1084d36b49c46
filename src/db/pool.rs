//! Database connection pool abstraction
//!
//! A single interface over SQLite and MySQL pools. Repositories match on
//! `driver()` and borrow the concrete pool for their queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// A connected store, either SQLite or MySQL
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run one statement that returns no rows; yields the affected row count
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<()>;

    /// Close every pooled connection
    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;
}

/// Shared handle to the configured store
pub type DynDatabasePool = Arc<dyn DatabasePool>;

impl dyn DatabasePool {
    /// Borrow the SQLite pool, failing if the driver is not SQLite
    pub fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite().context("Database pool is not SQLite")
    }

    /// Borrow the MySQL pool, failing if the driver is not MySQL
    pub fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql().context("Database pool is not MySQL")
    }
}

// ============================================================================
// SQLite
// ============================================================================

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database at `url` with up to
    /// `max_connections` pooled connections.
    ///
    /// `url` may be `:memory:`, a `sqlite:` URL or a bare file path.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let connection_url = sqlite_url(url);
        if let Some(path) = sqlite_file_path(&connection_url) {
            ensure_parent_dir(path)?;
        }

        // foreign_keys is per connection, so it must be part of the options
        let options = SqliteConnectOptions::from_str(&connection_url)
            .with_context(|| format!("Invalid SQLite URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        Ok(Self { pool })
    }
}

/// Normalize a configured SQLite location into a `sqlite:` URL
fn sqlite_url(url: &str) -> String {
    if url == ":memory:" {
        "sqlite::memory:".to_string()
    } else if url.starts_with("sqlite:") {
        url.to_string()
    } else {
        format!("sqlite:{}", url)
    }
}

/// File path behind a `sqlite:` URL, or `None` for in-memory databases
fn sqlite_file_path(connection_url: &str) -> Option<&Path> {
    let rest = connection_url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display())),
        _ => Ok(()),
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

// ============================================================================
// MySQL
// ============================================================================

pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    /// Connect to `url`, with or without its `mysql://` scheme
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to MySQL database: {}", url))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

/// Connect to the store named by `config`.
///
/// ```ignore
/// let pool = conduit::db::create_pool(&config.database).await?;
/// pool.ping().await?;
/// ```
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => {
            Arc::new(SqliteDatabase::connect(&config.url, config.max_connections).await?)
        }
        DatabaseDriver::Mysql => {
            Arc::new(MysqlDatabase::connect(&config.url, config.max_connections).await?)
        }
    };
    tracing::debug!(
        "Opened {:?} pool with up to {} connections",
        config.driver,
        config.max_connections
    );
    Ok(pool)
}

/// Create an in-memory SQLite pool, used throughout the test suites
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
        ..DatabaseConfig::default()
    };
    create_pool(&config).await
}
