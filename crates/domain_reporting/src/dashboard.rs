//! Dashboard summary
//!
//! All five figures are computed from a single snapshot, so they agree with
//! each other even while writes continue.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::MarketScope;
use domain_lending::PortfolioSnapshot;

use crate::metrics::{
    active_loans, cash_in_hand, due_today, portfolio_exposure, recovered_on_date, ActiveLoanCensus,
    CashPosition, DueTodayReport, PortfolioExposure, RecoveryReport,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub as_of: NaiveDate,
    pub scope: MarketScope,
    pub cash: CashPosition,
    pub recovered_today: RecoveryReport,
    pub active_loans: ActiveLoanCensus,
    pub due_today: DueTodayReport,
    pub exposure: PortfolioExposure,
}

pub fn dashboard(snapshot: &PortfolioSnapshot, as_of: NaiveDate) -> DashboardSummary {
    DashboardSummary {
        as_of,
        scope: snapshot.scope,
        cash: cash_in_hand(snapshot, as_of),
        recovered_today: recovered_on_date(snapshot, as_of),
        active_loans: active_loans(snapshot),
        due_today: due_today(snapshot, as_of),
        exposure: portfolio_exposure(snapshot, as_of),
    }
}
