//! SQL access for the lending tables
//!
//! [`rows`] holds the `FromRow` types and their conversion to domain types;
//! [`lending`] holds the queries.

pub mod lending;
pub mod rows;
