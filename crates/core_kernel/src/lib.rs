//! Core Kernel - Foundational types and utilities for the lending back-office
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money and rate types with precise decimal arithmetic
//! - Explicit clocks so "today" is always an input, never ambient state
//! - Strongly-typed identifiers
//! - Port infrastructure shared by adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod scope;

pub use money::{Money, MoneyError, Rate, MONEY_SCALE};
pub use temporal::{Clock, FixedClock, SystemClock, Timezone, TimezoneError};
pub use identifiers::{
    LoanId, ScheduleId, PaymentId, ActivityId, BorrowerId, MarketId, ActorId,
    LedgerEntryId,
};
pub use scope::MarketScope;
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
