//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and MySQL behind the
//! `DatabasePool` trait, so repositories never depend on one backend.
//!
//! ```ignore
//! use conduit::config::DatabaseConfig;
//! use conduit::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Whether an error chain contains a unique-constraint violation from the store
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}
