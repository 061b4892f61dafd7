//! Adapters for the lending domain
//!
//! The PostgreSQL adapter lives in `infra_db`; this module only carries the
//! in-memory store used by tests and local tooling.
//!
//! ```rust,ignore
//! use domain_lending::adapters::InMemoryLendingStore;
//! use domain_lending::LendingStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn LendingStore> = Arc::new(InMemoryLendingStore::new());
//! ```

pub mod memory;

pub use memory::InMemoryLendingStore;
