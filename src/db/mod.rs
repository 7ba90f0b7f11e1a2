//! Database layer
//!
//! Storage for categories and entries, backed by either:
//! - SQLite (default, single-file deployment)
//! - MySQL
//!
//! The driver is selected from configuration. Code above this layer only sees
//! the `DatabasePool` trait and the repository traits built on it.
//!
//! ```ignore
//! use marigold::config::DatabaseConfig;
//! use marigold::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
    SqliteLocation,
};
