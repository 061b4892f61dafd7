//! Lending application service
//!
//! Orchestrates the loan aggregate, schedule generation and obligation
//! resolution against a [`LendingStore`]. Each write operation builds one
//! commit and hands it to the store as a single unit of work.
//!
//! Mutations are serialized per loan: the service holds an async mutex for
//! the loan while it reads, decides and commits. The store's version check
//! catches writers in other processes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use core_kernel::{ActorId, Clock, LoanId, MarketId, MarketScope, Money, PaymentId, PortError};
use domain_ledger::{CashLedgerEntry, NewLedgerEntry};

use crate::activity::{ActivityAction, LoanActivity};
use crate::borrower::{Borrower, BorrowerRegistration, Market};
use crate::error::LendingError;
use crate::loan::{Loan, LoanApplication, LoanStatus, NewLoan};
use crate::obligation::ObligationResolver;
use crate::payment::{NewPayment, Payment, PaymentRequest};
use crate::ports::{DisbursementCommit, LendingStore, PaymentCommit, PaymentReceipt};
use crate::schedule::generate_schedule;

type LockTable = Arc<StdMutex<HashMap<LoanId, Arc<Mutex<()>>>>>;

/// Exclusive hold on one loan within this service
///
/// Dropping the last holder removes the loan's entry from the table, so the
/// table only ever holds loans that are locked or being waited on.
struct LoanGuard {
    loan_id: LoanId,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl Drop for LoanGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.loan_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.loan_id);
        }
    }
}

/// Write-side service for the lending back-office
pub struct LendingService {
    store: Arc<dyn LendingStore>,
    clock: Arc<dyn Clock>,
    loan_locks: LockTable,
}

impl LendingService {
    pub fn new(store: Arc<dyn LendingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            loan_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// The store this service writes to
    pub fn store(&self) -> Arc<dyn LendingStore> {
        Arc::clone(&self.store)
    }

    async fn lock_loan(&self, loan_id: LoanId) -> LoanGuard {
        let lock = {
            let mut locks = self.loan_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(loan_id).or_default())
        };
        LoanGuard {
            loan_id,
            guard: Some(lock.lock_owned().await),
            table: Arc::clone(&self.loan_locks),
        }
    }

    #[cfg(test)]
    fn tracked_loan_locks(&self) -> usize {
        self.loan_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    // ========================================================================
    // Parties
    // ========================================================================

    /// Registers a market
    #[instrument(skip(self, name))]
    pub async fn register_market(&self, code: &str, name: &str) -> Result<Market, LendingError> {
        let market = Market::new(code, name, self.clock.now())?;
        let market = self.store.insert_market(market).await?;
        info!(market_id = %market.id, code = %market.code, "Market registered");
        Ok(market)
    }

    /// Registers a borrower in an existing market
    ///
    /// # Errors
    ///
    /// - `Validation` for blank names, malformed phones or a phone number
    ///   already registered in the market
    /// - `NotFound` if the market does not exist
    #[instrument(skip(self, registration), fields(market_id = %registration.market_id))]
    pub async fn register_borrower(
        &self,
        registration: BorrowerRegistration,
        actor: ActorId,
    ) -> Result<Borrower, LendingError> {
        self.store.get_market(registration.market_id).await?;
        let borrower = Borrower::register(registration, actor, self.clock.now())?;
        let borrower = self.store.insert_borrower(borrower).await?;
        info!(borrower_id = %borrower.id, "Borrower registered");
        Ok(borrower)
    }

    // ========================================================================
    // Loan lifecycle
    // ========================================================================

    /// Takes a loan application; the loan starts out `pending`
    #[instrument(skip(self, application), fields(borrower_id = %application.borrower_id))]
    pub async fn apply_loan(
        &self,
        application: LoanApplication,
        actor: ActorId,
    ) -> Result<Loan, LendingError> {
        let borrower = self.store.get_borrower(application.borrower_id).await?;
        let new = NewLoan::from_application(
            application,
            &borrower,
            actor,
            self.clock.today(),
            self.clock.now(),
        )?;
        let activity = new.activity();
        let loan = self.store.commit_application(new, activity).await?;

        info!(
            loan_id = %loan.id,
            loan_number = %loan.loan_number,
            total = %loan.total_amount,
            "Loan application recorded"
        );
        Ok(loan)
    }

    #[instrument(skip(self))]
    pub async fn approve_loan(&self, loan_id: LoanId, actor: ActorId) -> Result<Loan, LendingError> {
        self.transition(loan_id, |loan, now| loan.approve(actor, now)).await
    }

    #[instrument(skip(self, reason))]
    pub async fn reject_loan(
        &self,
        loan_id: LoanId,
        actor: ActorId,
        reason: &str,
    ) -> Result<Loan, LendingError> {
        self.transition(loan_id, |loan, now| loan.reject(actor, reason, now)).await
    }

    /// Marks an active loan as defaulted
    #[instrument(skip(self, reason))]
    pub async fn mark_defaulted(
        &self,
        loan_id: LoanId,
        actor: ActorId,
        reason: &str,
    ) -> Result<Loan, LendingError> {
        self.transition(loan_id, |loan, now| loan.mark_defaulted(actor, reason, now)).await
    }

    /// Writes off a disbursed or active loan
    #[instrument(skip(self, reason))]
    pub async fn write_off(
        &self,
        loan_id: LoanId,
        actor: ActorId,
        reason: &str,
    ) -> Result<Loan, LendingError> {
        self.transition(loan_id, |loan, now| loan.write_off(actor, reason, now)).await
    }

    /// Soft-removes a pending or rejected loan
    #[instrument(skip(self))]
    pub async fn soft_remove_loan(&self, loan_id: LoanId, actor: ActorId) -> Result<Loan, LendingError> {
        self.transition(loan_id, |loan, now| loan.soft_remove(actor, now)).await
    }

    async fn transition<F>(&self, loan_id: LoanId, apply: F) -> Result<Loan, LendingError>
    where
        F: FnOnce(&mut Loan, DateTime<Utc>) -> Result<LoanActivity, LendingError> + Send,
    {
        let _guard = self.lock_loan(loan_id).await;

        let mut loan = self.store.get_loan(loan_id).await?;
        let from = loan.status;
        let activity = apply(&mut loan, self.clock.now())?;
        let action = activity.action;
        let loan = self.store.commit_transition(loan, activity).await?;

        info!(
            loan_id = %loan.id,
            from = %from,
            to = %loan.status,
            action = %action,
            "Loan transition committed"
        );
        Ok(loan)
    }

    /// Disburses an approved loan
    ///
    /// One unit of work: status change, installment plan, negative
    /// disbursement ledger entry and audit record.
    #[instrument(skip(self))]
    pub async fn disburse_loan(
        &self,
        loan_id: LoanId,
        disbursement_date: NaiveDate,
        actor: ActorId,
    ) -> Result<Loan, LendingError> {
        let _guard = self.lock_loan(loan_id).await;
        let now = self.clock.now();

        let mut loan = self.store.get_loan(loan_id).await?;
        let activity = loan.disburse(disbursement_date, actor, now)?;
        let schedules = generate_schedule(&loan, now)?;
        let ledger_entry = NewLedgerEntry::disbursement(
            loan.id,
            loan.market_id,
            loan.principal_amount,
            disbursement_date,
            format!("Disbursement of loan {}", loan.loan_number),
            actor,
        )?;

        let installments = schedules.len();
        let loan = self
            .store
            .commit_disbursement(DisbursementCommit {
                loan,
                schedules,
                ledger_entry,
                activity,
            })
            .await?;

        info!(
            loan_id = %loan.id,
            installments,
            principal = %loan.principal_amount,
            "Loan disbursed"
        );
        Ok(loan)
    }

    /// Records a repayment
    ///
    /// One unit of work: payment row, positive ledger entry, the linked
    /// installment's cached status and, when every installment is covered,
    /// loan completion. The first payment on a disbursed loan activates it.
    ///
    /// # Errors
    ///
    /// - `Validation` if the loan does not accept payments, the amount is not
    ///   positive, or the installment belongs to another loan
    /// - `ConcurrencyConflict` if the loan changed underneath; retry
    #[instrument(skip(self, request), fields(loan_id = %request.loan_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        request: PaymentRequest,
        actor: ActorId,
    ) -> Result<PaymentReceipt, LendingError> {
        let _guard = self.lock_loan(request.loan_id).await;
        let now = self.clock.now();
        let today = self.clock.today();

        let mut loan = self.store.get_loan(request.loan_id).await?;
        loan.ensure_accepts_payments()?;
        let payment = NewPayment::from_request(request, actor, now)?;

        let schedules = self.store.schedules_for_loan(loan.id).await?;
        let existing = self.store.payments_for_loan(loan.id).await?;

        let installment = match payment.schedule_id {
            Some(schedule_id) => Some(schedules.iter().find(|s| s.id == schedule_id).ok_or_else(|| {
                LendingError::validation(format!(
                    "installment {} does not belong to loan {}",
                    schedule_id, loan.loan_number
                ))
            })?),
            None => None,
        };

        let mut resolver = ObligationResolver::new(&existing);
        resolver.apply(payment.schedule_id, payment.amount);
        let schedule_status = installment.map(|s| (s.id, resolver.resolve_status(s, today)));

        let mut activities = vec![LoanActivity::new(
            loan.id,
            actor,
            ActivityAction::PaymentRecorded,
            format!("Received {} via {}", payment.amount, payment.method),
            now,
        )
        .with_metadata(json!({
            "payment_id": payment.id,
            "schedule_id": payment.schedule_id,
            "installment_number": installment.map(|s| s.installment_number),
            "payment_date": payment.payment_date,
        }))];

        if loan.status == LoanStatus::Disbursed {
            activities.push(loan.activate(actor, now)?);
        }
        if resolver.loan_is_complete(&schedules) {
            activities.push(loan.complete(actor, now)?);
        }

        let ledger_entry = NewLedgerEntry::repayment(
            loan.id,
            loan.market_id,
            payment.id,
            payment.amount,
            payment.payment_date,
            format!("Repayment on loan {}", loan.loan_number),
            actor,
        )?;

        let receipt = self
            .store
            .commit_payment(PaymentCommit {
                loan,
                payment,
                ledger_entry,
                schedule_status,
                activities,
            })
            .await?;

        info!(
            loan_id = %receipt.loan.id,
            receipt = %receipt.payment.receipt_number,
            status = %receipt.loan.status,
            "Payment recorded"
        );
        Ok(receipt)
    }

    /// Marks a payment as verified; only verified payments count toward
    /// daily recovery
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, payment_id: PaymentId, actor: ActorId) -> Result<Payment, LendingError> {
        let now = self.clock.now();
        let mut payment = self.store.get_payment(payment_id).await?;
        payment.verify(actor, now)?;

        let activity = LoanActivity::new(
            payment.loan_id,
            actor,
            ActivityAction::PaymentVerified,
            format!("Payment {} verified", payment.receipt_number),
            now,
        );
        let payment = self.store.commit_payment_verification(payment, activity).await?;

        info!(payment_id = %payment.id, receipt = %payment.receipt_number, "Payment verified");
        Ok(payment)
    }

    // ========================================================================
    // Cash
    // ========================================================================

    /// Adds owner capital to the float
    #[instrument(skip(self, description))]
    pub async fn record_capital_injection(
        &self,
        amount: Decimal,
        date: NaiveDate,
        market: Option<MarketId>,
        description: &str,
        actor: ActorId,
    ) -> Result<CashLedgerEntry, LendingError> {
        let entry = NewLedgerEntry::capital_injection(Money::new(amount), date, description, actor)?;
        self.append_cash(entry, market).await
    }

    /// Records an operating expense
    #[instrument(skip(self, description))]
    pub async fn record_expense(
        &self,
        amount: Decimal,
        date: NaiveDate,
        market: Option<MarketId>,
        description: &str,
        actor: ActorId,
    ) -> Result<CashLedgerEntry, LendingError> {
        let entry = NewLedgerEntry::expense(Money::new(amount), date, description, actor)?;
        self.append_cash(entry, market).await
    }

    async fn append_cash(
        &self,
        entry: NewLedgerEntry,
        market: Option<MarketId>,
    ) -> Result<CashLedgerEntry, LendingError> {
        if let Some(market_id) = market {
            self.store.get_market(market_id).await?;
        }
        let entry = self.store.append_ledger_entry(entry.in_market(market)).await?;
        info!(
            reference = %entry.reference_number,
            transaction_type = %entry.transaction_type,
            amount = %entry.amount,
            "Cash movement recorded"
        );
        Ok(entry)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Re-derives cached installment statuses for every open loan in scope
    ///
    /// Returns the number of installments whose status changed, which is how
    /// installments become `overdue` without a payment arriving. A loan that
    /// another writer changes mid-refresh is skipped and picked up next run.
    #[instrument(skip(self))]
    pub async fn refresh_overdue(&self, scope: MarketScope) -> Result<usize, LendingError> {
        let today = self.clock.today();
        let now = self.clock.now();
        let mut changed_total = 0;

        for listed in self.store.open_loans(scope).await? {
            let _guard = self.lock_loan(listed.id).await;

            // Read the loan before its payments so a payment landing in
            // between shows up as a version change.
            let loan = self.store.get_loan(listed.id).await?;
            if !loan.status.is_open() || loan.is_removed() {
                continue;
            }
            let mut schedules = self.store.schedules_for_loan(loan.id).await?;
            let payments = self.store.payments_for_loan(loan.id).await?;
            let changed = ObligationResolver::new(&payments).refresh_statuses(&mut schedules, today, now);
            if changed.is_empty() {
                continue;
            }

            let loan_id = loan.id;
            let count = changed.len();
            match self.store.update_schedule_statuses(loan, changed).await {
                Ok(()) => {
                    debug!(loan_id = %loan_id, changed = count, "Refreshed installment statuses");
                    changed_total += count;
                }
                Err(PortError::Conflict { message }) => {
                    warn!(loan_id = %loan_id, %message, "Loan changed during refresh; left for the next run");
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(changed = changed_total, %today, "Overdue refresh complete");
        Ok(changed_total)
    }

    /// Audit trail for a loan
    pub async fn loan_activities(&self, loan_id: LoanId) -> Result<Vec<LoanActivity>, LendingError> {
        self.store.get_loan(loan_id).await?;
        Ok(self.store.activities_for_loan(loan_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLendingStore;
    use core_kernel::FixedClock;

    fn service() -> LendingService {
        let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        LendingService::new(Arc::new(InMemoryLendingStore::new()), clock)
    }

    #[tokio::test]
    async fn test_loan_locks_are_dropped_after_use() {
        let service = service();
        for _ in 0..100 {
            let _guard = service.lock_loan(LoanId::new()).await;
            assert_eq!(service.tracked_loan_locks(), 1);
        }
        assert_eq!(service.tracked_loan_locks(), 0);
    }

    #[tokio::test]
    async fn test_lock_handed_to_waiter_is_dropped_by_waiter() {
        let service = Arc::new(service());
        let loan_id = LoanId::new();
        let first = service.lock_loan(loan_id).await;

        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let _guard = service.lock_loan(loan_id).await;
                service.tracked_loan_locks()
            })
        };
        tokio::task::yield_now().await;
        drop(first);

        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(service.tracked_loan_locks(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_sweep_leaves_no_locks_behind() {
        let service = service();
        assert_eq!(service.refresh_overdue(MarketScope::All).await.unwrap(), 0);
        assert_eq!(service.tracked_loan_locks(), 0);
    }
}
