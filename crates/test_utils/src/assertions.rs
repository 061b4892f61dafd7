//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::Money;
use domain_lending::{ActivityAction, LoanActivity, ObligationResolver, Payment, RepaymentSchedule};

/// Asserts that a Money value equals a plain amount
pub fn assert_money_eq(actual: Money, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Expected {}, got {}",
        expected,
        actual.amount()
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money.amount());
}

/// Asserts that installments sum exactly to the loan's total payable
pub fn assert_installments_sum_to(schedules: &[RepaymentSchedule], total: Money) {
    let sum: Money = schedules.iter().map(|s| s.expected_amount).sum();
    assert_eq!(
        sum,
        total,
        "Installments sum to {} but the loan total is {}",
        sum,
        total
    );
}

/// Asserts that installments are numbered 1..=n with strictly increasing due dates
pub fn assert_installments_ordered(schedules: &[RepaymentSchedule]) {
    for (i, schedule) in schedules.iter().enumerate() {
        assert_eq!(
            schedule.installment_number as usize,
            i + 1,
            "Installment at position {} is numbered {}",
            i,
            schedule.installment_number
        );
    }
    for pair in schedules.windows(2) {
        assert!(
            pair[0].due_date < pair[1].due_date,
            "Installment {} is due {} but installment {} is due {}",
            pair[0].installment_number,
            pair[0].due_date,
            pair[1].installment_number,
            pair[1].due_date
        );
    }
}

/// Asserts that every cached installment status matches the value derived
/// from the payments
pub fn assert_statuses_match_payments(
    schedules: &[RepaymentSchedule],
    payments: &[Payment],
    today: NaiveDate,
) {
    let resolver = ObligationResolver::new(payments);
    for schedule in schedules {
        let derived = resolver.resolve_status(schedule, today);
        assert_eq!(
            schedule.status, derived,
            "Installment {} caches {:?} but its payments say {:?}",
            schedule.installment_number, schedule.status, derived
        );
    }
}

/// Asserts the exact sequence of audit actions on a loan
pub fn assert_activity_actions(activities: &[LoanActivity], expected: &[ActivityAction]) {
    let actual: Vec<ActivityAction> = activities.iter().map(|a| a.action).collect();
    assert_eq!(actual, expected, "Unexpected audit trail");
}

/// Asserts that an action appears exactly `count` times in a trail
pub fn assert_activity_count(activities: &[LoanActivity], action: ActivityAction, count: usize) {
    let actual = activities.iter().filter(|a| a.action == action).count();
    assert_eq!(
        actual, count,
        "Expected {} {:?} activities, found {}",
        count, action, actual
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_assert_money_eq() {
        assert_money_eq(Money::new(dec!(1100.00)), dec!(1100));
    }

    #[test]
    #[should_panic(expected = "Expected zero money")]
    fn test_assert_money_zero_fails() {
        assert_money_zero(Money::new(dec!(0.01)));
    }

    #[test]
    fn test_empty_schedule_is_ordered() {
        assert_installments_ordered(&[]);
        assert_installments_sum_to(&[], Money::zero());
    }
}
