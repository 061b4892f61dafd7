//! In-memory lending store
//!
//! All state sits behind one `RwLock`. Every commit validates its
//! preconditions before touching any collection, so a failed commit leaves
//! nothing behind.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use core_kernel::{
    AdapterHealth, BorrowerId, DomainPort, HealthCheckResult, HealthCheckable, LoanId, MarketId,
    MarketScope, PaymentId, PortError,
};
use domain_ledger::{CashLedger, CashLedgerEntry, NewLedgerEntry, ReferencePrefix, ReferenceSequencer};

use crate::activity::LoanActivity;
use crate::borrower::{Borrower, Market};
use crate::loan::{Loan, NewLoan};
use crate::payment::Payment;
use crate::ports::{
    DisbursementCommit, LendingStore, PaymentCommit, PaymentReceipt, PortfolioSnapshot,
};
use crate::schedule::RepaymentSchedule;

#[derive(Debug, Default)]
struct State {
    markets: HashMap<MarketId, Market>,
    borrowers: HashMap<BorrowerId, Borrower>,
    loans: HashMap<LoanId, Loan>,
    schedules: HashMap<LoanId, Vec<RepaymentSchedule>>,
    payments: Vec<Payment>,
    activities: Vec<LoanActivity>,
    ledger: CashLedger,
    sequencer: ReferenceSequencer,
}

impl State {
    fn check_version(&self, loan: &Loan) -> Result<(), PortError> {
        let stored = self
            .loans
            .get(&loan.id)
            .ok_or_else(|| PortError::not_found("Loan", loan.id))?;
        if stored.version != loan.version {
            warn!(
                loan_id = %loan.id,
                expected = loan.version,
                found = stored.version,
                "Loan version conflict"
            );
            return Err(PortError::conflict(format!(
                "loan {} was modified concurrently (expected version {}, found {})",
                loan.loan_number, loan.version, stored.version
            )));
        }
        Ok(())
    }

    fn store_loan(&mut self, mut loan: Loan) -> Loan {
        loan.version += 1;
        self.loans.insert(loan.id, loan.clone());
        loan
    }
}

fn check_activity(loan_id: LoanId, activity: &LoanActivity) -> Result<(), PortError> {
    if activity.loan_id != loan_id {
        return Err(PortError::validation_field(
            format!("activity belongs to loan {}", activity.loan_id),
            "loan_id",
        ));
    }
    Ok(())
}

/// In-memory implementation of [`LendingStore`]
#[derive(Debug, Default)]
pub struct InMemoryLendingStore {
    state: RwLock<State>,
}

impl InMemoryLendingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryLendingStore {}

#[async_trait]
impl HealthCheckable for InMemoryLendingStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-lending-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LendingStore for InMemoryLendingStore {
    async fn get_market(&self, id: MarketId) -> Result<Market, PortError> {
        self.state
            .read()
            .await
            .markets
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Market", id))
    }

    async fn get_borrower(&self, id: BorrowerId) -> Result<Borrower, PortError> {
        self.state
            .read()
            .await
            .borrowers
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Borrower", id))
    }

    async fn get_loan(&self, id: LoanId) -> Result<Loan, PortError> {
        self.state
            .read()
            .await
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Loan", id))
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
        self.state
            .read()
            .await
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", id))
    }

    async fn schedules_for_loan(&self, loan_id: LoanId) -> Result<Vec<RepaymentSchedule>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .schedules
            .get(&loan_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn payments_for_loan(&self, loan_id: LoanId) -> Result<Vec<Payment>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .iter()
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn activities_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanActivity>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .activities
            .iter()
            .filter(|a| a.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn open_loans(&self, scope: MarketScope) -> Result<Vec<Loan>, PortError> {
        let state = self.state.read().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| l.status.is_open() && !l.is_removed() && scope.includes(Some(l.market_id)))
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.id);
        Ok(loans)
    }

    async fn portfolio_snapshot(&self, scope: MarketScope) -> Result<PortfolioSnapshot, PortError> {
        let state = self.state.read().await;

        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| !l.is_removed() && scope.includes(Some(l.market_id)))
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.id);

        let schedules = loans
            .iter()
            .filter_map(|l| state.schedules.get(&l.id))
            .flatten()
            .cloned()
            .collect();
        let payments = state
            .payments
            .iter()
            .filter(|p| loans.iter().any(|l| l.id == p.loan_id))
            .cloned()
            .collect();
        let ledger = state
            .ledger
            .entries()
            .iter()
            .filter(|e| scope.includes(e.market_id))
            .cloned()
            .collect();

        debug!(loans = loans.len(), "Built portfolio snapshot");
        Ok(PortfolioSnapshot {
            scope,
            loans,
            schedules,
            payments,
            ledger,
        })
    }

    async fn insert_market(&self, market: Market) -> Result<Market, PortError> {
        let mut state = self.state.write().await;
        if state.markets.values().any(|m| m.code == market.code) {
            return Err(PortError::validation_field(
                format!("market code {} already exists", market.code),
                "code",
            ));
        }
        state.markets.insert(market.id, market.clone());
        Ok(market)
    }

    async fn insert_borrower(&self, borrower: Borrower) -> Result<Borrower, PortError> {
        let mut state = self.state.write().await;
        if !state.markets.contains_key(&borrower.market_id) {
            return Err(PortError::not_found("Market", borrower.market_id));
        }
        if state
            .borrowers
            .values()
            .any(|b| b.market_id == borrower.market_id && b.phone == borrower.phone)
        {
            return Err(PortError::validation_field(
                format!("phone number {} is already registered in this market", borrower.phone),
                "phone",
            ));
        }
        state.borrowers.insert(borrower.id, borrower.clone());
        Ok(borrower)
    }

    async fn commit_application(&self, loan: NewLoan, activity: LoanActivity) -> Result<Loan, PortError> {
        check_activity(loan.id, &activity)?;
        let mut state = self.state.write().await;
        if !state.borrowers.contains_key(&loan.borrower_id) {
            return Err(PortError::not_found("Borrower", loan.borrower_id));
        }

        let number = state.sequencer.next(ReferencePrefix::Loan, loan.applied_on);
        let loan = Loan::from_new(loan, number);
        state.loans.insert(loan.id, loan.clone());
        state.activities.push(activity);

        debug!(loan_id = %loan.id, loan_number = %loan.loan_number, "Stored loan application");
        Ok(loan)
    }

    async fn commit_transition(&self, loan: Loan, activity: LoanActivity) -> Result<Loan, PortError> {
        check_activity(loan.id, &activity)?;
        let mut state = self.state.write().await;
        state.check_version(&loan)?;

        let loan = state.store_loan(loan);
        state.activities.push(activity);
        Ok(loan)
    }

    async fn commit_disbursement(&self, commit: DisbursementCommit) -> Result<Loan, PortError> {
        let DisbursementCommit {
            loan,
            mut schedules,
            ledger_entry,
            activity,
        } = commit;
        check_activity(loan.id, &activity)?;
        if schedules.iter().any(|s| s.loan_id != loan.id) || ledger_entry.loan_id != Some(loan.id) {
            return Err(PortError::validation("disbursement rows must belong to the loan"));
        }

        let mut state = self.state.write().await;
        state.check_version(&loan)?;
        if state.schedules.get(&loan.id).is_some_and(|s| !s.is_empty()) {
            return Err(PortError::validation(format!(
                "loan {} already has a repayment schedule",
                loan.loan_number
            )));
        }

        schedules.sort_by_key(|s| s.installment_number);
        let count = schedules.len();
        let created_at = loan.updated_at;
        state.schedules.insert(loan.id, schedules);
        state.ledger.append(ledger_entry, created_at);
        state.activities.push(activity);
        let loan = state.store_loan(loan);

        debug!(loan_id = %loan.id, installments = count, "Stored disbursement");
        Ok(loan)
    }

    async fn commit_payment(&self, commit: PaymentCommit) -> Result<PaymentReceipt, PortError> {
        let PaymentCommit {
            loan,
            payment,
            ledger_entry,
            schedule_status,
            activities,
        } = commit;
        for activity in &activities {
            check_activity(loan.id, activity)?;
        }
        if payment.loan_id != loan.id || ledger_entry.payment_id != Some(payment.id) {
            return Err(PortError::validation("payment rows must belong to the loan"));
        }

        let mut state = self.state.write().await;
        state.check_version(&loan)?;

        let schedule_index = match (payment.schedule_id, schedule_status) {
            (Some(schedule_id), Some((status_id, _))) if schedule_id == status_id => {
                let index = state
                    .schedules
                    .get(&loan.id)
                    .and_then(|rows| rows.iter().position(|s| s.id == schedule_id))
                    .ok_or_else(|| PortError::not_found("RepaymentSchedule", schedule_id))?;
                Some(index)
            }
            (None, None) => None,
            _ => {
                return Err(PortError::validation(
                    "schedule status update must match the payment's installment",
                ))
            }
        };

        let receipt_number = state.sequencer.next(ReferencePrefix::Receipt, payment.payment_date);
        let created_at = payment.created_at;
        let payment = Payment::from_new(payment, receipt_number);
        state.payments.push(payment.clone());

        let ledger_entry = state.ledger.append(ledger_entry, created_at).clone();

        if let (Some(index), Some((_, status))) = (schedule_index, schedule_status) {
            if let Some(row) = state.schedules.get_mut(&loan.id).and_then(|rows| rows.get_mut(index)) {
                row.status = status;
                row.updated_at = created_at;
            }
        }

        state.activities.extend(activities);
        let loan = state.store_loan(loan);

        debug!(
            loan_id = %loan.id,
            receipt = %payment.receipt_number,
            amount = %payment.amount,
            "Stored payment"
        );
        Ok(PaymentReceipt {
            loan,
            payment,
            ledger_entry,
        })
    }

    async fn commit_payment_verification(
        &self,
        payment: Payment,
        activity: LoanActivity,
    ) -> Result<Payment, PortError> {
        check_activity(payment.loan_id, &activity)?;
        let mut state = self.state.write().await;

        let stored = state
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| PortError::not_found("Payment", payment.id))?;
        if stored.is_verified {
            return Err(PortError::conflict(format!(
                "payment {} was already verified",
                stored.receipt_number
            )));
        }
        stored.is_verified = true;
        stored.verified_by = payment.verified_by;
        stored.verified_at = payment.verified_at;
        let verified = stored.clone();

        state.activities.push(activity);
        Ok(verified)
    }

    async fn update_schedule_statuses(
        &self,
        loan: Loan,
        schedules: Vec<RepaymentSchedule>,
    ) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        state.check_version(&loan)?;

        let mut positions = Vec::with_capacity(schedules.len());
        for schedule in &schedules {
            if schedule.loan_id != loan.id {
                return Err(PortError::validation("installment rows must belong to the loan"));
            }
            let index = state
                .schedules
                .get(&schedule.loan_id)
                .and_then(|rows| rows.iter().position(|s| s.id == schedule.id))
                .ok_or_else(|| PortError::not_found("RepaymentSchedule", schedule.id))?;
            positions.push(index);
        }

        for (schedule, index) in schedules.into_iter().zip(positions) {
            if let Some(row) = state
                .schedules
                .get_mut(&schedule.loan_id)
                .and_then(|rows| rows.get_mut(index))
            {
                row.status = schedule.status;
                row.updated_at = schedule.updated_at;
            }
        }
        Ok(())
    }

    async fn append_ledger_entry(&self, entry: NewLedgerEntry) -> Result<CashLedgerEntry, PortError> {
        let mut state = self.state.write().await;
        Ok(state.ledger.append(entry, Utc::now()).clone())
    }
}
