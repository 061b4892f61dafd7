//! PostgreSQL Lending Store
//!
//! Implements [`LendingStore`] on top of the functions in
//! [`crate::repositories::lending`]. Each `commit_*` call runs in its own
//! transaction: the loan row is locked with `SELECT ... FOR UPDATE`, its
//! version compared with the one the caller read, and every effect written
//! before the transaction commits. Reference counters are bumped inside
//! the same transaction, so a rolled-back commit never consumes a number.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, BorrowerId, DomainPort, HealthCheckResult, HealthCheckable, LedgerEntryId,
    LoanId, MarketId, MarketScope, PaymentId, PortError,
};
use domain_ledger::{CashLedgerEntry, NewLedgerEntry, ReferencePrefix};
use domain_lending::{
    Borrower, DisbursementCommit, LendingStore, Loan, LoanActivity, Market, NewLoan, Payment,
    PaymentCommit, PaymentReceipt, PortfolioSnapshot, RepaymentSchedule,
};

use crate::error::DatabaseError;
use crate::repositories::lending as repo;

const ADAPTER_ID: &str = "postgres-lending-store";
const BORROWER_PHONE_CONSTRAINT: &str = "borrowers_market_phone_key";

/// PostgreSQL-backed implementation of [`LendingStore`]
#[derive(Debug, Clone)]
pub struct PostgresLendingStore {
    pool: PgPool,
}

impl PostgresLendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, DatabaseError> {
        Ok(self.pool.acquire().await?)
    }
}

/// Locks the loan row and checks it is still at the version the caller read
async fn lock_loan(conn: &mut PgConnection, loan: &Loan) -> Result<(), DatabaseError> {
    let stored = repo::fetch_loan(conn, loan.id, true)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Loan", loan.id))?;
    if stored.version != loan.version {
        warn!(
            loan_id = %loan.id,
            expected = loan.version,
            found = stored.version,
            "Loan version conflict"
        );
        return Err(DatabaseError::VersionConflict(format!(
            "loan {} was modified concurrently (expected version {}, found {})",
            loan.loan_number, loan.version, stored.version
        )));
    }
    Ok(())
}

/// Writes the loan at `version + 1` and returns what was stored
async fn store_loan(conn: &mut PgConnection, mut loan: Loan) -> Result<Loan, DatabaseError> {
    if !repo::update_loan(conn, &loan, loan.version).await? {
        return Err(DatabaseError::VersionConflict(format!(
            "loan {} changed while it was locked",
            loan.loan_number
        )));
    }
    loan.version += 1;
    Ok(loan)
}

/// Numbers and inserts a ledger entry
async fn append_entry(
    conn: &mut PgConnection,
    entry: NewLedgerEntry,
    created_at: DateTime<Utc>,
) -> Result<CashLedgerEntry, DatabaseError> {
    let reference = repo::next_reference(conn, ReferencePrefix::Cash, entry.transaction_date).await?;
    let entry = CashLedgerEntry::from_new(entry, LedgerEntryId::new_v7(), reference, created_at);
    repo::insert_ledger_entry(conn, &entry).await?;
    debug!(
        reference = %entry.reference_number,
        transaction_type = %entry.transaction_type,
        amount = %entry.amount,
        "Appended cash ledger entry"
    );
    Ok(entry)
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

impl DomainPort for PostgresLendingStore {}

#[async_trait]
impl HealthCheckable for PostgresLendingStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {e}"))),
        };
        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LendingStore for PostgresLendingStore {
    #[instrument(skip(self), fields(market_id = %id))]
    async fn get_market(&self, id: MarketId) -> Result<Market, PortError> {
        let mut conn = self.connection().await?;
        repo::fetch_market(&mut conn, id)
            .await?
            .ok_or_else(|| PortError::not_found("Market", id))
    }

    #[instrument(skip(self), fields(borrower_id = %id))]
    async fn get_borrower(&self, id: BorrowerId) -> Result<Borrower, PortError> {
        let mut conn = self.connection().await?;
        repo::fetch_borrower(&mut conn, id)
            .await?
            .ok_or_else(|| PortError::not_found("Borrower", id))
    }

    #[instrument(skip(self), fields(loan_id = %id))]
    async fn get_loan(&self, id: LoanId) -> Result<Loan, PortError> {
        let mut conn = self.connection().await?;
        repo::fetch_loan(&mut conn, id, false)
            .await?
            .ok_or_else(|| PortError::not_found("Loan", id))
    }

    #[instrument(skip(self), fields(payment_id = %id))]
    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
        let mut conn = self.connection().await?;
        repo::fetch_payment(&mut conn, id, false)
            .await?
            .ok_or_else(|| PortError::not_found("Payment", id))
    }

    async fn schedules_for_loan(&self, loan_id: LoanId) -> Result<Vec<RepaymentSchedule>, PortError> {
        let mut conn = self.connection().await?;
        Ok(repo::fetch_schedules(&mut conn, loan_id).await?)
    }

    async fn payments_for_loan(&self, loan_id: LoanId) -> Result<Vec<Payment>, PortError> {
        let mut conn = self.connection().await?;
        Ok(repo::fetch_payments(&mut conn, loan_id).await?)
    }

    async fn activities_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanActivity>, PortError> {
        let mut conn = self.connection().await?;
        Ok(repo::fetch_activities(&mut conn, loan_id).await?)
    }

    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    async fn open_loans(&self, scope: MarketScope) -> Result<Vec<Loan>, PortError> {
        let mut conn = self.connection().await?;
        Ok(repo::fetch_loans(&mut conn, scope, true).await?)
    }

    #[instrument(skip(self), fields(market = ?scope.market_id()))]
    async fn portfolio_snapshot(&self, scope: MarketScope) -> Result<PortfolioSnapshot, PortError> {
        let mut tx = self.begin().await?;
        // One MVCC snapshot for all four reads
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from)?;

        let loans = repo::fetch_loans(&mut tx, scope, false).await?;
        let schedules = repo::fetch_scoped_schedules(&mut tx, scope).await?;
        let payments = repo::fetch_scoped_payments(&mut tx, scope).await?;
        let ledger = repo::fetch_scoped_ledger(&mut tx, scope).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(loans = loans.len(), ledger_entries = ledger.len(), "Built portfolio snapshot");
        Ok(PortfolioSnapshot {
            scope,
            loans,
            schedules,
            payments,
            ledger,
        })
    }

    #[instrument(skip(self, market), fields(code = %market.code))]
    async fn insert_market(&self, market: Market) -> Result<Market, PortError> {
        let mut conn = self.connection().await?;
        match repo::insert_market(&mut conn, &market).await {
            Ok(()) => Ok(market),
            Err(DatabaseError::DuplicateEntry { .. }) => Err(PortError::validation_field(
                format!("market code {} already exists", market.code),
                "code",
            )),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, borrower), fields(market_id = %borrower.market_id))]
    async fn insert_borrower(&self, borrower: Borrower) -> Result<Borrower, PortError> {
        let mut tx = self.begin().await?;
        if repo::fetch_market(&mut tx, borrower.market_id).await?.is_none() {
            return Err(PortError::not_found("Market", borrower.market_id));
        }

        match repo::insert_borrower(&mut tx, &borrower).await {
            Ok(()) => {}
            Err(DatabaseError::DuplicateEntry { constraint, .. })
                if constraint.as_deref() == Some(BORROWER_PHONE_CONSTRAINT) =>
            {
                return Err(PortError::validation_field(
                    format!("phone number {} is already registered in this market", borrower.phone),
                    "phone",
                ));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(borrower)
    }

    #[instrument(skip(self, loan, activity), fields(loan_id = %loan.id))]
    async fn commit_application(&self, loan: NewLoan, activity: LoanActivity) -> Result<Loan, PortError> {
        check_activity(loan.id, &activity)?;
        let mut tx = self.begin().await?;
        if repo::fetch_borrower(&mut tx, loan.borrower_id).await?.is_none() {
            return Err(PortError::not_found("Borrower", loan.borrower_id));
        }

        let number = repo::next_reference(&mut tx, ReferencePrefix::Loan, loan.applied_on).await?;
        let loan = Loan::from_new(loan, number);
        repo::insert_loan(&mut tx, &loan).await?;
        repo::insert_activity(&mut tx, &activity).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(loan_number = %loan.loan_number, "Stored loan application");
        Ok(loan)
    }

    #[instrument(skip(self, loan, activity), fields(loan_id = %loan.id, status = %loan.status))]
    async fn commit_transition(&self, loan: Loan, activity: LoanActivity) -> Result<Loan, PortError> {
        check_activity(loan.id, &activity)?;
        let mut tx = self.begin().await?;
        lock_loan(&mut tx, &loan).await?;

        let loan = store_loan(&mut tx, loan).await?;
        repo::insert_activity(&mut tx, &activity).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(loan)
    }

    #[instrument(skip(self, commit), fields(loan_id = %commit.loan.id))]
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

        let mut tx = self.begin().await?;
        lock_loan(&mut tx, &loan).await?;
        if repo::count_schedules(&mut tx, loan.id).await? > 0 {
            return Err(PortError::validation(format!(
                "loan {} already has a repayment schedule",
                loan.loan_number
            )));
        }

        schedules.sort_by_key(|s| s.installment_number);
        for schedule in &schedules {
            repo::insert_schedule(&mut tx, schedule).await?;
        }
        append_entry(&mut tx, ledger_entry, loan.updated_at).await?;
        repo::insert_activity(&mut tx, &activity).await?;
        let loan = store_loan(&mut tx, loan).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(installments = schedules.len(), "Stored disbursement");
        Ok(loan)
    }

    #[instrument(skip(self, commit), fields(loan_id = %commit.loan.id, amount = %commit.payment.amount))]
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
        let status_update = match (payment.schedule_id, schedule_status) {
            (Some(schedule_id), Some((status_id, status))) if schedule_id == status_id => {
                Some((schedule_id, status))
            }
            (None, None) => None,
            _ => {
                return Err(PortError::validation(
                    "schedule status update must match the payment's installment",
                ))
            }
        };

        let mut tx = self.begin().await?;
        lock_loan(&mut tx, &loan).await?;
        if let Some((schedule_id, _)) = status_update {
            if !repo::schedule_belongs_to(&mut tx, schedule_id, loan.id).await? {
                return Err(PortError::not_found("RepaymentSchedule", schedule_id));
            }
        }

        let receipt_number =
            repo::next_reference(&mut tx, ReferencePrefix::Receipt, payment.payment_date).await?;
        let created_at = payment.created_at;
        let payment = Payment::from_new(payment, receipt_number);
        repo::insert_payment(&mut tx, &payment).await?;

        let ledger_entry = append_entry(&mut tx, ledger_entry, created_at).await?;

        if let Some((schedule_id, status)) = status_update {
            repo::update_schedule_status(&mut tx, schedule_id, status, created_at).await?;
        }
        for activity in &activities {
            repo::insert_activity(&mut tx, activity).await?;
        }
        let loan = store_loan(&mut tx, loan).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(receipt = %payment.receipt_number, "Stored payment");
        Ok(PaymentReceipt {
            loan,
            payment,
            ledger_entry,
        })
    }

    #[instrument(skip(self, payment, activity), fields(payment_id = %payment.id))]
    async fn commit_payment_verification(
        &self,
        payment: Payment,
        activity: LoanActivity,
    ) -> Result<Payment, PortError> {
        check_activity(payment.loan_id, &activity)?;
        let mut tx = self.begin().await?;

        let stored = repo::fetch_payment(&mut tx, payment.id, true)
            .await?
            .ok_or_else(|| PortError::not_found("Payment", payment.id))?;
        if stored.is_verified || !repo::mark_payment_verified(&mut tx, &payment).await? {
            return Err(PortError::conflict(format!(
                "payment {} was already verified",
                stored.receipt_number
            )));
        }
        repo::insert_activity(&mut tx, &activity).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        Ok(Payment {
            is_verified: true,
            verified_by: payment.verified_by,
            verified_at: payment.verified_at,
            ..stored
        })
    }

    #[instrument(skip(self, loan, schedules), fields(loan_id = %loan.id, count = schedules.len()))]
    async fn update_schedule_statuses(
        &self,
        loan: Loan,
        schedules: Vec<RepaymentSchedule>,
    ) -> Result<(), PortError> {
        if schedules.is_empty() {
            return Ok(());
        }
        if schedules.iter().any(|s| s.loan_id != loan.id) {
            return Err(PortError::validation("installment rows must belong to the loan"));
        }
        let mut tx = self.begin().await?;
        lock_loan(&mut tx, &loan).await?;
        for schedule in &schedules {
            if !repo::update_schedule_status(&mut tx, schedule.id, schedule.status, schedule.updated_at).await? {
                return Err(PortError::not_found("RepaymentSchedule", schedule.id));
            }
        }
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(transaction_type = %entry.transaction_type))]
    async fn append_ledger_entry(&self, entry: NewLedgerEntry) -> Result<CashLedgerEntry, PortError> {
        let mut tx = self.begin().await?;
        let entry = append_entry(&mut tx, entry, Utc::now()).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(entry)
    }
}
