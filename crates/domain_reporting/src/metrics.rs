//! Portfolio calculations
//!
//! Each function is a pure fold over a [`PortfolioSnapshot`]. Nothing is
//! cached and nothing reads the wall clock: the date a figure is "as of" is
//! always an argument. Installment balances are re-derived from payments;
//! the cached schedule status is never consulted.
//!
//! Missing rows are zeros, never errors. An empty portfolio yields zero
//! totals and zero rates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use core_kernel::{LoanId, MarketScope, Money, ScheduleId};
use domain_ledger::{cash_in_hand as ledger_cash_in_hand, ReferenceNumber};
use domain_lending::{
    Loan, ObligationResolver, PortfolioSnapshot, RepaymentFrequency, RepaymentSchedule,
};

/// Cash-in-hand at the end of a business day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashPosition {
    pub as_of: NaiveDate,
    pub scope: MarketScope,
    pub amount: Money,
}

/// Verified repayments received on one day
///
/// Loans repaid bi-weekly have no bucket of their own; their payments are
/// reported in `unclassified` and are part of `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub date: NaiveDate,
    pub total: Money,
    pub daily: Money,
    pub weekly: Money,
    pub monthly: Money,
    pub unclassified: Money,
    pub payment_count: usize,
}

/// Loan count and principal for one repayment frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyBreakdown {
    pub frequency: RepaymentFrequency,
    pub count: usize,
    pub principal: Money,
}

/// Loans that still have money to collect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLoanCensus {
    pub count: usize,
    pub principal: Money,
    /// One row per frequency with at least one loan, in frequency order
    pub by_frequency: Vec<FrequencyBreakdown>,
}

/// One installment falling due on the report date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueInstallment {
    pub schedule_id: ScheduleId,
    pub loan_id: LoanId,
    pub loan_number: Option<ReferenceNumber>,
    pub installment_number: u32,
    pub expected: Money,
    /// Lifetime payments linked to the installment, not only same-day ones
    pub collected: Money,
    pub outstanding: Money,
}

/// Installments due on one day and how much of them has been collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueTodayReport {
    pub date: NaiveDate,
    pub paid: Vec<DueInstallment>,
    pub pending: Vec<DueInstallment>,
    pub expected_total: Money,
    pub collected_total: Money,
    /// `collected / expected × 100`, two places; zero when nothing is due
    pub collection_rate: Decimal,
}

/// Outstanding money across disbursed and active loans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioExposure {
    pub as_of: NaiveDate,
    pub total_expected: Money,
    pub total_received: Money,
    pub total_outstanding: Money,
    /// Outstanding on installments past due as of `as_of`
    pub overdue_outstanding: Money,
    pub current_outstanding: Money,
    /// `received / expected × 100`, two places; zero for an empty portfolio
    pub recovery_rate: Decimal,
}

/// Lookup tables over a snapshot, restricted to its scope
pub(crate) struct PortfolioIndex<'a> {
    pub(crate) loans: HashMap<LoanId, &'a Loan>,
    pub(crate) schedules: HashMap<LoanId, Vec<&'a RepaymentSchedule>>,
    pub(crate) resolver: ObligationResolver,
}

impl<'a> PortfolioIndex<'a> {
    pub(crate) fn new(snapshot: &'a PortfolioSnapshot) -> Self {
        let loans: HashMap<LoanId, &Loan> = snapshot
            .loans
            .iter()
            .filter(|l| !l.is_removed() && snapshot.scope.includes(Some(l.market_id)))
            .map(|l| (l.id, l))
            .collect();

        let mut schedules: HashMap<LoanId, Vec<&RepaymentSchedule>> = HashMap::new();
        for schedule in snapshot.schedules.iter().filter(|s| loans.contains_key(&s.loan_id)) {
            schedules.entry(schedule.loan_id).or_default().push(schedule);
        }
        for rows in schedules.values_mut() {
            rows.sort_by_key(|s| s.installment_number);
        }

        let resolver =
            ObligationResolver::new(snapshot.payments.iter().filter(|p| loans.contains_key(&p.loan_id)));

        Self {
            loans,
            schedules,
            resolver,
        }
    }

    pub(crate) fn schedules_of(&self, loan_id: LoanId) -> &[&'a RepaymentSchedule] {
        self.schedules.get(&loan_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn open_loans(&self) -> impl Iterator<Item = &&'a Loan> {
        self.loans.values().filter(|l| l.status.is_open())
    }
}

/// Sum of every ledger entry dated on or before `as_of`
pub fn cash_in_hand(snapshot: &PortfolioSnapshot, as_of: NaiveDate) -> CashPosition {
    CashPosition {
        as_of,
        scope: snapshot.scope,
        amount: ledger_cash_in_hand(&snapshot.ledger, as_of, &snapshot.scope),
    }
}

/// Verified payments dated `date`, bucketed by the loan's frequency
pub fn recovered_on_date(snapshot: &PortfolioSnapshot, date: NaiveDate) -> RecoveryReport {
    let index = PortfolioIndex::new(snapshot);
    let mut report = RecoveryReport {
        date,
        total: Money::zero(),
        daily: Money::zero(),
        weekly: Money::zero(),
        monthly: Money::zero(),
        unclassified: Money::zero(),
        payment_count: 0,
    };

    for payment in snapshot
        .payments
        .iter()
        .filter(|p| p.is_verified && p.payment_date == date)
    {
        let Some(loan) = index.loans.get(&payment.loan_id) else {
            continue;
        };
        report.total += payment.amount;
        report.payment_count += 1;
        match loan.frequency {
            RepaymentFrequency::Daily => report.daily += payment.amount,
            RepaymentFrequency::Weekly => report.weekly += payment.amount,
            RepaymentFrequency::Monthly => report.monthly += payment.amount,
            RepaymentFrequency::BiWeekly => report.unclassified += payment.amount,
        }
    }
    report
}

/// Disbursed or active loans with at least one unpaid installment
///
/// A loan without installments is left out.
pub fn active_loans(snapshot: &PortfolioSnapshot) -> ActiveLoanCensus {
    let index = PortfolioIndex::new(snapshot);
    let mut groups: HashMap<RepaymentFrequency, (usize, Money)> = HashMap::new();

    for loan in index.open_loans() {
        let has_unpaid = index
            .schedules_of(loan.id)
            .iter()
            .any(|s| !index.resolver.is_paid(s));
        if !has_unpaid {
            continue;
        }
        let group = groups.entry(loan.frequency).or_insert((0, Money::zero()));
        group.0 += 1;
        group.1 += loan.principal_amount;
    }

    let by_frequency: Vec<FrequencyBreakdown> = RepaymentFrequency::ALL
        .iter()
        .filter_map(|f| {
            groups.get(f).map(|(count, principal)| FrequencyBreakdown {
                frequency: *f,
                count: *count,
                principal: *principal,
            })
        })
        .collect();

    ActiveLoanCensus {
        count: by_frequency.iter().map(|g| g.count).sum(),
        principal: by_frequency.iter().map(|g| g.principal).sum(),
        by_frequency,
    }
}

/// Installments due on `date`, split by whether they are fully paid
pub fn due_today(snapshot: &PortfolioSnapshot, date: NaiveDate) -> DueTodayReport {
    let index = PortfolioIndex::new(snapshot);
    let mut due: Vec<&RepaymentSchedule> = index
        .schedules
        .values()
        .flatten()
        .copied()
        .filter(|s| s.due_date == date)
        .collect();
    due.sort_by_key(|s| (s.loan_id, s.installment_number));

    let mut paid = Vec::new();
    let mut pending = Vec::new();
    let mut expected_total = Money::zero();
    let mut collected_total = Money::zero();

    for schedule in due {
        let row = DueInstallment {
            schedule_id: schedule.id,
            loan_id: schedule.loan_id,
            loan_number: index.loans.get(&schedule.loan_id).map(|l| l.loan_number),
            installment_number: schedule.installment_number,
            expected: schedule.expected_amount,
            collected: index.resolver.amount_paid(schedule),
            outstanding: index.resolver.outstanding(schedule),
        };
        expected_total += row.expected;
        collected_total += row.collected;
        if index.resolver.is_paid(schedule) {
            paid.push(row);
        } else {
            pending.push(row);
        }
    }

    DueTodayReport {
        date,
        paid,
        pending,
        expected_total,
        collected_total,
        collection_rate: collected_total.percentage_of(expected_total),
    }
}

/// Expected, received and outstanding money over disbursed and active loans
///
/// `total_received` counts every payment on those loans, linked to an
/// installment or not. `current_outstanding` is floored at zero: unlinked
/// payments lower the loan total without settling any overdue installment.
pub fn portfolio_exposure(snapshot: &PortfolioSnapshot, as_of: NaiveDate) -> PortfolioExposure {
    let index = PortfolioIndex::new(snapshot);
    let open: HashMap<LoanId, &Loan> = index.open_loans().map(|l| (l.id, *l)).collect();

    let mut total_expected = Money::zero();
    let mut overdue_outstanding = Money::zero();
    for loan_id in open.keys() {
        for schedule in index.schedules_of(*loan_id) {
            total_expected += schedule.expected_amount;
            if index.resolver.is_overdue(schedule, as_of) {
                overdue_outstanding += index.resolver.outstanding(schedule);
            }
        }
    }

    let total_received: Money = snapshot
        .payments
        .iter()
        .filter(|p| open.contains_key(&p.loan_id))
        .map(|p| p.amount)
        .sum();
    let total_outstanding = total_expected.saturating_sub(total_received);

    PortfolioExposure {
        as_of,
        total_expected,
        total_received,
        total_outstanding,
        overdue_outstanding,
        current_outstanding: total_outstanding.saturating_sub(overdue_outstanding),
        recovery_rate: total_received.percentage_of(total_expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    #[test]
    fn test_empty_portfolio_is_all_zero() {
        let snapshot = PortfolioSnapshot::default();

        assert!(cash_in_hand(&snapshot, date()).amount.is_zero());
        assert!(recovered_on_date(&snapshot, date()).total.is_zero());

        let census = active_loans(&snapshot);
        assert_eq!(census.count, 0);
        assert!(census.by_frequency.is_empty());

        let due = due_today(&snapshot, date());
        assert_eq!(due.collection_rate, dec!(0));

        let exposure = portfolio_exposure(&snapshot, date());
        assert!(exposure.total_outstanding.is_zero());
        assert_eq!(exposure.recovery_rate, dec!(0));
    }

    mod ledger_properties {
        use super::*;
        use chrono::{Days, Utc};
        use core_kernel::ActorId;
        use domain_ledger::{CashLedger, NewLedgerEntry};
        use proptest::prelude::*;

        fn snapshot_of(movements: &[(bool, i64, u64)]) -> PortfolioSnapshot {
            let actor = ActorId::new();
            let mut ledger = CashLedger::new();
            for (inflow, cents, offset) in movements {
                let amount = Money::from_minor(*cents);
                let day = date() + Days::new(*offset);
                let entry = if *inflow {
                    NewLedgerEntry::capital_injection(amount, day, "Float", actor)
                } else {
                    NewLedgerEntry::expense(amount, day, "Costs", actor)
                };
                ledger.append(entry.unwrap(), Utc::now());
            }
            PortfolioSnapshot {
                ledger: ledger.entries().to_vec(),
                ..PortfolioSnapshot::default()
            }
        }

        proptest! {
            #[test]
            fn cash_is_the_sum_of_entries_up_to_the_date(
                movements in prop::collection::vec((any::<bool>(), 1i64..10_000_000, 0u64..30), 0..40),
                as_of_offset in 0u64..35,
            ) {
                let snapshot = snapshot_of(&movements);
                let as_of = date() + Days::new(as_of_offset);

                let expected: Money = snapshot
                    .ledger
                    .iter()
                    .filter(|e| e.transaction_date <= as_of)
                    .map(|e| e.amount)
                    .sum();
                prop_assert_eq!(cash_in_hand(&snapshot, as_of).amount, expected);
            }

            #[test]
            fn cash_moves_by_exactly_the_day_movements(
                movements in prop::collection::vec((any::<bool>(), 1i64..10_000_000, 1u64..30), 0..40),
                offset in 1u64..30,
            ) {
                let snapshot = snapshot_of(&movements);
                let day = date() + Days::new(offset);
                let before = cash_in_hand(&snapshot, day - Days::new(1)).amount;
                let after = cash_in_hand(&snapshot, day).amount;

                let on_day: Money = snapshot
                    .ledger
                    .iter()
                    .filter(|e| e.transaction_date == day)
                    .map(|e| e.amount)
                    .sum();
                prop_assert_eq!(after - before, on_day);
            }
        }
    }
}
