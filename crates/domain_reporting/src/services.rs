//! Reporting application service
//!
//! Loads a fresh [`PortfolioSnapshot`] for every call and hands it to the
//! pure calculations. Reads take no per-loan locks.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, instrument};

use core_kernel::{Clock, LoanId, MarketScope};
use domain_lending::{LendingStore, PortfolioSnapshot};

use crate::balance::{loan_balance, LoanBalance};
use crate::dashboard::{dashboard, DashboardSummary};
use crate::error::ReportingError;
use crate::metrics::{
    self, ActiveLoanCensus, CashPosition, DueTodayReport, PortfolioExposure, RecoveryReport,
};

/// Read-side service for the back-office dashboard
pub struct ReportingService {
    store: Arc<dyn LendingStore>,
    clock: Arc<dyn Clock>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn LendingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn as_of(&self, as_of: Option<NaiveDate>) -> NaiveDate {
        as_of.unwrap_or_else(|| self.clock.today())
    }

    async fn snapshot(&self, scope: MarketScope) -> Result<PortfolioSnapshot, ReportingError> {
        let snapshot = self.store.portfolio_snapshot(scope).await?;
        debug!(
            loans = snapshot.loans.len(),
            payments = snapshot.payments.len(),
            ledger_entries = snapshot.ledger.len(),
            "Loaded portfolio snapshot"
        );
        Ok(snapshot)
    }

    /// Cash-in-hand at the end of `as_of`, today when omitted
    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    pub async fn cash_in_hand(
        &self,
        as_of: Option<NaiveDate>,
        scope: MarketScope,
    ) -> Result<CashPosition, ReportingError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(metrics::cash_in_hand(&snapshot, self.as_of(as_of)))
    }

    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    pub async fn recovered_on_date(
        &self,
        date: NaiveDate,
        scope: MarketScope,
    ) -> Result<RecoveryReport, ReportingError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(metrics::recovered_on_date(&snapshot, date))
    }

    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    pub async fn active_loans(&self, scope: MarketScope) -> Result<ActiveLoanCensus, ReportingError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(metrics::active_loans(&snapshot))
    }

    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    pub async fn due_today(
        &self,
        date: NaiveDate,
        scope: MarketScope,
    ) -> Result<DueTodayReport, ReportingError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(metrics::due_today(&snapshot, date))
    }

    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    pub async fn portfolio_exposure(
        &self,
        as_of: Option<NaiveDate>,
        scope: MarketScope,
    ) -> Result<PortfolioExposure, ReportingError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(metrics::portfolio_exposure(&snapshot, self.as_of(as_of)))
    }

    /// Balance of a single loan; overdue counts are as of today
    #[instrument(skip(self), fields(loan_id = %loan_id))]
    pub async fn loan_balance(&self, loan_id: LoanId) -> Result<LoanBalance, ReportingError> {
        let loan = self.store.get_loan(loan_id).await?;
        if loan.is_removed() {
            return Err(ReportingError::NotFound {
                entity: "Loan".to_string(),
                id: loan_id.to_string(),
            });
        }
        let schedules = self.store.schedules_for_loan(loan_id).await?;
        let payments = self.store.payments_for_loan(loan_id).await?;
        Ok(loan_balance(&loan, &schedules, &payments, self.clock.today()))
    }

    /// Every dashboard figure from one snapshot
    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    pub async fn dashboard(
        &self,
        as_of: Option<NaiveDate>,
        scope: MarketScope,
    ) -> Result<DashboardSummary, ReportingError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(dashboard(&snapshot, self.as_of(as_of)))
    }
}
