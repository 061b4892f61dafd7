//! Per-loan balance

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{LoanId, Money, ScheduleId};
use domain_ledger::ReferenceNumber;
use domain_lending::{Loan, LoanStatus, ObligationResolver, Payment, RepaymentSchedule};

/// The earliest installment that is not fully paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextInstallment {
    pub schedule_id: ScheduleId,
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub outstanding: Money,
}

/// What a borrower has paid on a loan and what they still owe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanBalance {
    pub loan_id: LoanId,
    pub loan_number: ReferenceNumber,
    pub status: LoanStatus,
    pub total_amount: Money,
    pub total_paid: Money,
    pub outstanding: Money,
    pub installments_paid: usize,
    pub installments_remaining: usize,
    /// Unpaid installments due before `as_of`
    pub installments_overdue: usize,
    pub next_due: Option<NextInstallment>,
}

/// Derives a loan's balance from its installments and payments
///
/// Every payment counts toward `total_paid`, linked or not. Installment
/// counts only see linked payments.
pub fn loan_balance(
    loan: &Loan,
    schedules: &[RepaymentSchedule],
    payments: &[Payment],
    as_of: NaiveDate,
) -> LoanBalance {
    let own_payments = payments.iter().filter(|p| p.loan_id == loan.id);
    let total_paid: Money = own_payments.clone().map(|p| p.amount).sum();
    let resolver = ObligationResolver::new(own_payments);

    let mut ordered: Vec<&RepaymentSchedule> =
        schedules.iter().filter(|s| s.loan_id == loan.id).collect();
    ordered.sort_by_key(|s| s.installment_number);

    let installments_paid = ordered.iter().filter(|s| resolver.is_paid(s)).count();
    let installments_overdue = ordered
        .iter()
        .filter(|s| resolver.is_overdue(s, as_of))
        .count();
    let next_due = ordered
        .iter()
        .find(|s| !resolver.is_paid(s))
        .map(|s| NextInstallment {
            schedule_id: s.id,
            installment_number: s.installment_number,
            due_date: s.due_date,
            outstanding: resolver.outstanding(s),
        });

    LoanBalance {
        loan_id: loan.id,
        loan_number: loan.loan_number,
        status: loan.status,
        total_amount: loan.total_amount,
        total_paid,
        outstanding: loan.total_amount.saturating_sub(total_paid),
        installments_paid,
        installments_remaining: ordered.len() - installments_paid,
        installments_overdue,
        next_due,
    }
}
