//! Pre-built Test Fixtures
//!
//! Provides ready-to-use dates, amounts and identities. These fixtures are
//! designed to be consistent and predictable for unit tests.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{ActorId, Money};

/// Fixture for business dates
pub struct DateFixtures;

impl DateFixtures {
    /// The day most test portfolios open on (Jan 1, 2024)
    pub fn opening_day() -> NaiveDate {
        Self::date(2024, 1, 1)
    }

    /// A leap day, for reference-number and month-end checks
    pub fn leap_day() -> NaiveDate {
        Self::date(2024, 2, 29)
    }

    /// `n` days after the opening day
    pub fn day(n: u64) -> NaiveDate {
        Self::opening_day()
            .checked_add_days(Days::new(n))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Builds a date, panicking on an impossible one
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap_or_else(|| panic!("invalid fixture date {year}-{month}-{day}"))
    }
}

/// Fixture for money amounts
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Principal used in the standard daily loan
    pub fn principal() -> Decimal {
        dec!(10000)
    }

    /// Flat interest rate, in percent, used in the standard loan
    pub fn interest_rate() -> Decimal {
        dec!(10)
    }

    /// One installment of the standard daily loan
    pub fn daily_installment() -> Money {
        Money::new(dec!(1100))
    }

    /// Opening float for cash tests
    pub fn opening_float() -> Decimal {
        dec!(50000)
    }
}

/// Fixture for people operating the back-office
pub struct ActorFixtures;

impl ActorFixtures {
    /// A loan officer
    pub fn officer() -> ActorId {
        ActorId::new()
    }

    /// A supervisor who approves applications
    pub fn supervisor() -> ActorId {
        ActorId::new()
    }
}

/// Fixture for borrower details
pub struct BorrowerFixtures;

impl BorrowerFixtures {
    /// A distinct, valid phone number for the `n`th borrower
    pub fn phone(n: u32) -> String {
        format!("07{:08}", n)
    }

    pub fn name(n: u32) -> String {
        format!("Test Borrower {n}")
    }
}
