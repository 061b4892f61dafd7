//! Port adapters backed by PostgreSQL

pub mod lending;

pub use lending::PostgresLendingStore;
