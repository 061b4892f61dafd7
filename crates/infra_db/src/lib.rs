//! PostgreSQL persistence for the lending back office
//!
//! Provides the pool and migration helpers and [`PostgresLendingStore`],
//! the production implementation of `domain_lending::LendingStore`.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLendingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/lending")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLendingStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::PostgresLendingStore;
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
