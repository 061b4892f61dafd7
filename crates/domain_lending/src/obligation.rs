//! Obligation resolution
//!
//! Derives what has been paid against each installment from the payments
//! linked to it. Nothing here reads the cached `status` column; the resolver
//! is what writes it.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use core_kernel::{Money, ScheduleId};

use crate::payment::Payment;
use crate::schedule::{RepaymentSchedule, ScheduleStatus};

/// Paid-to-date index over a set of payments
///
/// Build it from every payment that may reference the schedules being
/// resolved. Payments without a schedule link are ignored here; they still
/// count toward the loan's total paid.
#[derive(Debug, Clone, Default)]
pub struct ObligationResolver {
    paid: HashMap<ScheduleId, Money>,
}

impl ObligationResolver {
    pub fn new<'a, I>(payments: I) -> Self
    where
        I: IntoIterator<Item = &'a Payment>,
    {
        let mut resolver = Self::default();
        for payment in payments {
            resolver.apply(payment.schedule_id, payment.amount);
        }
        resolver
    }

    /// Adds a payment that is not yet persisted
    pub fn apply(&mut self, schedule_id: Option<ScheduleId>, amount: Money) {
        if let Some(id) = schedule_id {
            *self.paid.entry(id).or_default() += amount;
        }
    }

    /// Sum of payments linked to the installment
    pub fn amount_paid(&self, schedule: &RepaymentSchedule) -> Money {
        self.paid.get(&schedule.id).copied().unwrap_or_default()
    }

    /// `max(0, expected - paid)`
    pub fn outstanding(&self, schedule: &RepaymentSchedule) -> Money {
        schedule.expected_amount.saturating_sub(self.amount_paid(schedule))
    }

    pub fn is_paid(&self, schedule: &RepaymentSchedule) -> bool {
        self.amount_paid(schedule) >= schedule.expected_amount
    }

    /// Past due and not fully paid; an installment due today is never overdue
    pub fn is_overdue(&self, schedule: &RepaymentSchedule, today: NaiveDate) -> bool {
        schedule.due_date < today && !self.is_paid(schedule)
    }

    pub fn resolve_status(&self, schedule: &RepaymentSchedule, today: NaiveDate) -> ScheduleStatus {
        if self.is_paid(schedule) {
            ScheduleStatus::Paid
        } else if self.is_overdue(schedule, today) {
            ScheduleStatus::Overdue
        } else {
            ScheduleStatus::Pending
        }
    }

    /// Rewrites the cached status; returns true if it changed
    pub fn update_status(
        &self,
        schedule: &mut RepaymentSchedule,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> bool {
        let status = self.resolve_status(schedule, today);
        if schedule.status == status {
            return false;
        }
        schedule.status = status;
        schedule.updated_at = now;
        true
    }

    /// Re-derives every cached status, returning the rows that changed
    pub fn refresh_statuses(
        &self,
        schedules: &mut [RepaymentSchedule],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<RepaymentSchedule> {
        schedules
            .iter_mut()
            .filter_map(|s| self.update_status(s, today, now).then(|| s.clone()))
            .collect()
    }

    /// A loan is complete when it has at least one installment and every
    /// installment is paid
    pub fn loan_is_complete(&self, schedules: &[RepaymentSchedule]) -> bool {
        !schedules.is_empty() && schedules.iter().all(|s| self.is_paid(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::PaymentMethod;
    use chrono::Days;
    use core_kernel::{ActorId, LoanId, PaymentId};
    use domain_ledger::{ReferenceNumber, ReferencePrefix};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn schedule(expected: Money, due_date: NaiveDate) -> RepaymentSchedule {
        RepaymentSchedule {
            id: ScheduleId::new(),
            loan_id: LoanId::new(),
            installment_number: 1,
            due_date,
            expected_amount: expected,
            status: ScheduleStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn payment(schedule: &RepaymentSchedule, amount: Money) -> Payment {
        Payment {
            id: PaymentId::new(),
            receipt_number: ReferenceNumber::new(ReferencePrefix::Receipt, today(), 1),
            loan_id: schedule.loan_id,
            schedule_id: Some(schedule.id),
            amount,
            payment_date: today(),
            method: PaymentMethod::Cash,
            is_verified: false,
            verified_by: None,
            verified_at: None,
            notes: None,
            recorded_by: ActorId::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_partial_payment_past_due_is_overdue() {
        let s = schedule(Money::new(dec!(500)), today() - Days::new(5));
        let payments = vec![payment(&s, Money::new(dec!(200)))];
        let resolver = ObligationResolver::new(&payments);

        assert!(resolver.is_overdue(&s, today()));
        assert_eq!(resolver.outstanding(&s).amount(), dec!(300));
        assert_eq!(resolver.resolve_status(&s, today()), ScheduleStatus::Overdue);
    }

    #[test]
    fn test_due_today_is_never_overdue() {
        let s = schedule(Money::new(dec!(500)), today());
        let resolver = ObligationResolver::default();
        assert!(!resolver.is_overdue(&s, today()));
        assert_eq!(resolver.resolve_status(&s, today()), ScheduleStatus::Pending);
    }

    #[test]
    fn test_overpayment_floors_outstanding() {
        let s = schedule(Money::new(dec!(500)), today());
        let payments = vec![payment(&s, Money::new(dec!(450))), payment(&s, Money::new(dec!(100)))];
        let resolver = ObligationResolver::new(&payments);

        assert!(resolver.is_paid(&s));
        assert!(resolver.outstanding(&s).is_zero());
        assert_eq!(resolver.amount_paid(&s).amount(), dec!(550));
    }

    #[test]
    fn test_cached_status_is_not_trusted() {
        let mut s = schedule(Money::new(dec!(500)), today() - Days::new(1));
        s.status = ScheduleStatus::Paid;
        let resolver = ObligationResolver::default();

        assert!(!resolver.is_paid(&s));
        assert!(resolver.update_status(&mut s, today(), Utc::now()));
        assert_eq!(s.status, ScheduleStatus::Overdue);
        assert!(!resolver.update_status(&mut s, today(), Utc::now()));
    }

    #[test]
    fn test_unlinked_payments_do_not_settle_installments() {
        let s = schedule(Money::new(dec!(500)), today());
        let mut p = payment(&s, Money::new(dec!(500)));
        p.schedule_id = None;
        let resolver = ObligationResolver::new([&p]);
        assert!(!resolver.is_paid(&s));
    }

    #[test]
    fn test_completion_requires_schedules() {
        let resolver = ObligationResolver::default();
        assert!(!resolver.loan_is_complete(&[]));

        let s = schedule(Money::new(dec!(100)), today());
        let mut resolver = ObligationResolver::default();
        resolver.apply(Some(s.id), Money::new(dec!(100)));
        assert!(resolver.loan_is_complete(std::slice::from_ref(&s)));
    }

    #[test]
    fn test_refresh_returns_changed_rows_only() {
        let mut schedules = vec![
            schedule(Money::new(dec!(100)), today() - Days::new(2)),
            schedule(Money::new(dec!(100)), today() + Days::new(2)),
        ];
        let changed = ObligationResolver::default().refresh_statuses(&mut schedules, today(), Utc::now());
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].status, ScheduleStatus::Overdue);
    }

    proptest! {
        #[test]
        fn outstanding_is_never_negative(
            expected in 1i64..10_000_000i64,
            paid in prop::collection::vec(1i64..10_000_000i64, 0..6),
        ) {
            let s = schedule(Money::from_minor(expected), today());
            let payments: Vec<Payment> = paid.iter().map(|m| payment(&s, Money::from_minor(*m))).collect();
            let resolver = ObligationResolver::new(&payments);

            let outstanding = resolver.outstanding(&s);
            prop_assert!(!outstanding.is_negative());
            prop_assert_eq!(outstanding.is_zero(), resolver.is_paid(&s));
        }
    }
}
