//! Repayment schedules
//!
//! A disbursed loan's total payable is split into installments once, at
//! disbursement. The cached `status` on each row is an index for filtering;
//! balances are always re-derived from payments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{LoanId, Money, ScheduleId};

use crate::error::LendingError;
use crate::loan::Loan;

/// Cached obligation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Paid,
    Overdue,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Paid => "paid",
            ScheduleStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "paid" => Ok(ScheduleStatus::Paid),
            "overdue" => Ok(ScheduleStatus::Overdue),
            other => Err(LendingError::validation(format!("unknown schedule status '{}'", other))),
        }
    }
}

/// One expected installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentSchedule {
    pub id: ScheduleId,
    pub loan_id: LoanId,
    /// 1-based, sequential, no gaps
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub expected_amount: Money,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generates the full installment plan for a disbursed loan
///
/// Each installment is `total / count` rounded to cents; the last one takes
/// the remainder so the plan sums to `total_amount` exactly. Installment `i`
/// falls due `i` periods after the disbursement date.
///
/// # Errors
///
/// Returns a validation error if the loan has no disbursement date, a zero
/// duration, or a total too small to split into the required installments.
pub fn generate_schedule(loan: &Loan, now: DateTime<Utc>) -> Result<Vec<RepaymentSchedule>, LendingError> {
    let start = loan.disbursement_date.ok_or_else(|| {
        LendingError::validation(format!("loan {} has no disbursement date", loan.loan_number))
    })?;
    if loan.duration_days == 0 {
        return Err(LendingError::validation(format!(
            "loan {} has a zero duration",
            loan.loan_number
        )));
    }

    let count = loan.frequency.installment_count(loan.duration_days);
    let amounts = loan.total_amount.split_with_final_remainder(count)?;

    amounts
        .into_iter()
        .zip(1..=count)
        .map(|(expected_amount, installment_number)| {
            let due_date = loan
                .frequency
                .due_date(start, installment_number)
                .ok_or_else(|| LendingError::validation("installment due date is out of range"))?;
            Ok(RepaymentSchedule {
                id: ScheduleId::new_v7(),
                loan_id: loan.id,
                installment_number,
                due_date,
                expected_amount,
                status: ScheduleStatus::Pending,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}
