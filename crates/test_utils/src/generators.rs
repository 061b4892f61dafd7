//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Money;
use domain_lending::RepaymentFrequency;

use crate::fixtures::DateFixtures;

/// Strategy for any repayment frequency
pub fn frequency_strategy() -> impl Strategy<Value = RepaymentFrequency> {
    prop_oneof![
        Just(RepaymentFrequency::Daily),
        Just(RepaymentFrequency::Weekly),
        Just(RepaymentFrequency::BiWeekly),
        Just(RepaymentFrequency::Monthly),
    ]
}

/// Strategy for principals between 1.00 and 1,000,000.00
pub fn principal_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for flat interest rates between 0% and 50%, two places
pub fn interest_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..5_000i64).prop_map(|basis| Decimal::new(basis, 2))
}

/// Strategy for loan durations up to two years
pub fn duration_strategy() -> impl Strategy<Value = u32> {
    1u32..730u32
}

/// Strategy for positive amounts in cents
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..10_000_000i64).prop_map(Money::from_minor)
}

/// Strategy for signed ledger amounts, never zero
pub fn ledger_amount_strategy() -> impl Strategy<Value = Money> {
    (1i64..10_000_000i64, any::<bool>())
        .prop_map(|(cents, inflow)| Money::from_minor(if inflow { cents } else { -cents }))
}

/// Strategy for dates within a year of the opening day
pub fn business_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..365u64).prop_map(|offset| {
        DateFixtures::opening_day()
            .checked_add_days(Days::new(offset))
            .unwrap_or(NaiveDate::MAX)
    })
}
