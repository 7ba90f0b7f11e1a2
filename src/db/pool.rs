//! Connection pools for the two supported backends
//!
//! Repositories receive a `DynDatabasePool` and branch on `driver()` to reach
//! the concrete sqlx pool through `sqlite()` or `mysql()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};

use crate::config::{DatabaseConfig, DatabaseDriver};

/// A pool of connections to the blog database
#[async_trait]
pub trait DatabasePool: Send + Sync {
    fn driver(&self) -> DatabaseDriver;

    /// The SQLite pool, or an error on another backend
    fn sqlite(&self) -> Result<&SqlitePool> {
        bail!("Expected a SQLite pool, found {:?}", self.driver())
    }

    /// The MySQL pool, or an error on another backend
    fn mysql(&self) -> Result<&MySqlPool> {
        bail!("Expected a MySQL pool, found {:?}", self.driver())
    }

    /// Run a statement without bound values, returning the affected rows
    async fn execute(&self, statement: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self);
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Where a SQLite database lives, resolved from the configured url
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    Memory,
    File { url: String, path: PathBuf },
}

impl SqliteLocation {
    /// Accepts `:memory:`, `sqlite::memory:`, `sqlite:path[?options]` and bare paths.
    /// File databases are opened with `mode=rwc` unless options are given.
    pub fn parse(url: &str) -> Self {
        if url == ":memory:" || url.starts_with("sqlite::memory:") {
            return Self::Memory;
        }
        match url.strip_prefix("sqlite:") {
            Some(rest) => {
                let path = rest.split('?').next().unwrap_or(rest);
                let url = if url.contains('?') {
                    url.to_string()
                } else {
                    format!("{}?mode=rwc", url)
                };
                Self::File { url, path: PathBuf::from(path) }
            }
            None => Self::File {
                url: format!("sqlite:{}?mode=rwc", url),
                path: PathBuf::from(url),
            },
        }
    }
}

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = match SqliteLocation::parse(url) {
            // each connection to :memory: is a separate database
            SqliteLocation::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .context("Failed to open in-memory SQLite database")?,
            SqliteLocation::File { url, path } => {
                ensure_parent_dir(&path)?;
                SqlitePoolOptions::new()
                    .max_connections(8)
                    .connect(&url)
                    .await
                    .with_context(|| format!("Failed to open SQLite database {}", path.display()))?
            }
        };

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .context("Failed to enable foreign keys")?;

        Ok(Self { pool })
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display())),
        _ => Ok(()),
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn sqlite(&self) -> Result<&SqlitePool> {
        Ok(&self.pool)
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        let done = sqlx::query(statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute: {}", statement))?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("SQLite database is not reachable")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn connect(url: &str) -> Result<Self> {
        let url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };
        let pool = MySqlPoolOptions::new()
            .max_connections(16)
            .connect(&url)
            .await
            .context("Failed to connect to MySQL")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn mysql(&self) -> Result<&MySqlPool> {
        Ok(&self.pool)
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        let done = sqlx::query(statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute: {}", statement))?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("MySQL database is not reachable")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Open the database named by the configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::connect(&config.url).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::connect(&config.url).await?),
    };
    tracing::debug!("Opened {:?} database", config.driver);
    Ok(pool)
}

/// Empty in-memory SQLite database, for tests
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    })
    .await
}
