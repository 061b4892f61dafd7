//! Repayment frequency
//!
//! The frequency decides how many installments a loan is split into and how
//! far apart their due dates fall.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LendingError;

/// How often a borrower repays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentFrequency {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
}

impl RepaymentFrequency {
    /// All frequencies in reporting order
    pub const ALL: [RepaymentFrequency; 4] = [
        RepaymentFrequency::Daily,
        RepaymentFrequency::Weekly,
        RepaymentFrequency::BiWeekly,
        RepaymentFrequency::Monthly,
    ];

    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentFrequency::Daily => "daily",
            RepaymentFrequency::Weekly => "weekly",
            RepaymentFrequency::BiWeekly => "bi_weekly",
            RepaymentFrequency::Monthly => "monthly",
        }
    }

    /// Nominal period length in days, used for the installment count
    pub fn period_days(&self) -> u32 {
        match self {
            RepaymentFrequency::Daily => 1,
            RepaymentFrequency::Weekly => 7,
            RepaymentFrequency::BiWeekly => 14,
            RepaymentFrequency::Monthly => 30,
        }
    }

    /// Number of installments for a loan term: `ceil(duration_days / period)`
    pub fn installment_count(&self, duration_days: u32) -> u32 {
        duration_days.div_ceil(self.period_days())
    }

    /// Due date of installment `n` (1-based) for a loan disbursed on `start`
    ///
    /// Monthly installments move by calendar months and clamp to the last
    /// day of shorter months. Returns `None` if the date overflows.
    pub fn due_date(&self, start: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            RepaymentFrequency::Daily => start.checked_add_days(Days::new(u64::from(n))),
            RepaymentFrequency::Weekly => start.checked_add_days(Days::new(7 * u64::from(n))),
            RepaymentFrequency::BiWeekly => start.checked_add_days(Days::new(14 * u64::from(n))),
            RepaymentFrequency::Monthly => start.checked_add_months(Months::new(n)),
        }
    }
}

impl fmt::Display for RepaymentFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepaymentFrequency {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RepaymentFrequency::Daily),
            "weekly" => Ok(RepaymentFrequency::Weekly),
            "bi_weekly" | "bi-weekly" | "biweekly" => Ok(RepaymentFrequency::BiWeekly),
            "monthly" => Ok(RepaymentFrequency::Monthly),
            other => Err(LendingError::validation(format!(
                "unknown repayment frequency '{}'",
                other
            ))),
        }
    }
}
