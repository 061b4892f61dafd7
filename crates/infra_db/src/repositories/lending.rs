//! Lending repository
//!
//! Plain SQL over a single connection. Functions take `&mut PgConnection`
//! so the adapter can run several of them inside one transaction; none of
//! them begins or commits on its own.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use core_kernel::{BorrowerId, LoanId, MarketId, MarketScope, PaymentId, ScheduleId};
use domain_ledger::{CashLedgerEntry, ReferenceNumber, ReferencePrefix};
use domain_lending::{
    Borrower, Loan, LoanActivity, Market, Payment, RepaymentSchedule, ScheduleStatus,
};

use crate::error::DatabaseError;
use crate::repositories::rows::{
    convert_all, ActivityRow, BorrowerRow, LedgerRow, LoanRow, MarketRow, PaymentRow, ScheduleRow,
    LEDGER_COLUMNS, LOAN_COLUMNS, PAYMENT_COLUMNS, SCHEDULE_COLUMNS,
};

// ============================================================================
// Reference numbers
// ============================================================================

/// Allocates the next reference for `(prefix, date)`
///
/// The upsert holds a row lock on the counter until the surrounding
/// transaction ends, so two transactions never receive the same number.
pub async fn next_reference(
    conn: &mut PgConnection,
    prefix: ReferencePrefix,
    date: NaiveDate,
) -> Result<ReferenceNumber, DatabaseError> {
    let sequence: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO reference_sequences (prefix, business_date, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, business_date)
        DO UPDATE SET last_value = reference_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(prefix.as_str())
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;

    let sequence = u32::try_from(sequence).map_err(|e| DatabaseError::decode("last_value", e))?;
    Ok(ReferenceNumber::new(prefix, date, sequence))
}

// ============================================================================
// Markets and borrowers
// ============================================================================

pub async fn fetch_market(conn: &mut PgConnection, id: MarketId) -> Result<Option<Market>, DatabaseError> {
    let row: Option<MarketRow> =
        sqlx::query_as("SELECT id, code, name, created_at FROM markets WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(Market::from))
}

pub async fn insert_market(conn: &mut PgConnection, market: &Market) -> Result<(), DatabaseError> {
    sqlx::query("INSERT INTO markets (id, code, name, created_at) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::from(market.id))
        .bind(&market.code)
        .bind(&market.name)
        .bind(market.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fetch_borrower(
    conn: &mut PgConnection,
    id: BorrowerId,
) -> Result<Option<Borrower>, DatabaseError> {
    let row: Option<BorrowerRow> = sqlx::query_as(
        r#"
        SELECT id, market_id, full_name, phone, national_id, is_active, registered_by, registered_at
        FROM borrowers
        WHERE id = $1
        "#,
    )
    .bind(Uuid::from(id))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Borrower::from))
}

pub async fn insert_borrower(conn: &mut PgConnection, borrower: &Borrower) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO borrowers (
            id, market_id, full_name, phone, national_id, is_active, registered_by, registered_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::from(borrower.id))
    .bind(Uuid::from(borrower.market_id))
    .bind(&borrower.full_name)
    .bind(&borrower.phone)
    .bind(&borrower.national_id)
    .bind(borrower.is_active)
    .bind(Uuid::from(borrower.registered_by))
    .bind(borrower.registered_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Loans
// ============================================================================

/// Loads a loan, optionally taking its row lock for the rest of the transaction
pub async fn fetch_loan(
    conn: &mut PgConnection,
    id: LoanId,
    for_update: bool,
) -> Result<Option<Loan>, DatabaseError> {
    let sql = format!(
        "SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row: Option<LoanRow> = sqlx::query_as(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Loan::try_from).transpose()
}

/// Loans in scope that are not soft-removed, ordered by id
pub async fn fetch_loans(
    conn: &mut PgConnection,
    scope: MarketScope,
    open_only: bool,
) -> Result<Vec<Loan>, DatabaseError> {
    let sql = format!(
        "SELECT {LOAN_COLUMNS} FROM loans \
         WHERE removed_at IS NULL AND ($1::uuid IS NULL OR market_id = $1){} \
         ORDER BY id",
        if open_only { " AND status IN ('disbursed', 'active')" } else { "" }
    );
    let rows: Vec<LoanRow> = sqlx::query_as(&sql)
        .bind(scope.market_id().map(Uuid::from))
        .fetch_all(&mut *conn)
        .await?;
    convert_all(rows)
}

pub async fn insert_loan(conn: &mut PgConnection, loan: &Loan) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO loans (
            id, loan_number, borrower_id, market_id, principal_amount, interest_rate,
            interest_amount, total_amount, duration_days, frequency, purpose, status,
            applied_by, version, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(Uuid::from(loan.id))
    .bind(loan.loan_number.to_string())
    .bind(Uuid::from(loan.borrower_id))
    .bind(Uuid::from(loan.market_id))
    .bind(loan.principal_amount.amount())
    .bind(loan.interest_rate.as_decimal())
    .bind(loan.interest_amount.amount())
    .bind(loan.total_amount.amount())
    .bind(duration_days(loan)?)
    .bind(loan.frequency.as_str())
    .bind(&loan.purpose)
    .bind(loan.status.as_str())
    .bind(Uuid::from(loan.applied_by))
    .bind(loan.version)
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Writes every mutable loan column if the stored version is still `expected_version`
///
/// Returns false when no row matched, meaning another writer got there first.
pub async fn update_loan(
    conn: &mut PgConnection,
    loan: &Loan,
    expected_version: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE loans SET
            status = $3,
            approved_by = $4,
            approved_at = $5,
            rejected_by = $6,
            rejected_at = $7,
            rejection_reason = $8,
            disbursement_date = $9,
            due_date = $10,
            disbursed_by = $11,
            completed_at = $12,
            closed_at = $13,
            closure_reason = $14,
            removed_at = $15,
            updated_at = $16,
            version = version + 1
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(Uuid::from(loan.id))
    .bind(expected_version)
    .bind(loan.status.as_str())
    .bind(loan.approved_by.map(Uuid::from))
    .bind(loan.approved_at)
    .bind(loan.rejected_by.map(Uuid::from))
    .bind(loan.rejected_at)
    .bind(&loan.rejection_reason)
    .bind(loan.disbursement_date)
    .bind(loan.due_date)
    .bind(loan.disbursed_by.map(Uuid::from))
    .bind(loan.completed_at)
    .bind(loan.closed_at)
    .bind(&loan.closure_reason)
    .bind(loan.removed_at)
    .bind(loan.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

fn duration_days(loan: &Loan) -> Result<i32, DatabaseError> {
    i32::try_from(loan.duration_days).map_err(|e| DatabaseError::decode("duration_days", e))
}

// ============================================================================
// Installments
// ============================================================================

pub async fn fetch_schedules(
    conn: &mut PgConnection,
    loan_id: LoanId,
) -> Result<Vec<RepaymentSchedule>, DatabaseError> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM repayment_schedules WHERE loan_id = $1 \
         ORDER BY installment_number"
    );
    let rows: Vec<ScheduleRow> = sqlx::query_as(&sql)
        .bind(Uuid::from(loan_id))
        .fetch_all(&mut *conn)
        .await?;
    convert_all(rows)
}

/// Installments of the loans `fetch_loans(scope, false)` would return
pub async fn fetch_scoped_schedules(
    conn: &mut PgConnection,
    scope: MarketScope,
) -> Result<Vec<RepaymentSchedule>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM repayment_schedules s JOIN loans l ON l.id = s.loan_id \
         WHERE l.removed_at IS NULL AND ($1::uuid IS NULL OR l.market_id = $1) \
         ORDER BY s.loan_id, s.installment_number",
        qualified("s", SCHEDULE_COLUMNS)
    );
    let rows: Vec<ScheduleRow> = sqlx::query_as(&sql)
        .bind(scope.market_id().map(Uuid::from))
        .fetch_all(&mut *conn)
        .await?;
    convert_all(rows)
}

pub async fn count_schedules(conn: &mut PgConnection, loan_id: LoanId) -> Result<i64, DatabaseError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repayment_schedules WHERE loan_id = $1")
        .bind(Uuid::from(loan_id))
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn schedule_belongs_to(
    conn: &mut PgConnection,
    schedule_id: ScheduleId,
    loan_id: LoanId,
) -> Result<bool, DatabaseError> {
    let found: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM repayment_schedules WHERE id = $1 AND loan_id = $2")
            .bind(Uuid::from(schedule_id))
            .bind(Uuid::from(loan_id))
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

pub async fn insert_schedule(
    conn: &mut PgConnection,
    schedule: &RepaymentSchedule,
) -> Result<(), DatabaseError> {
    let installment_number = i32::try_from(schedule.installment_number)
        .map_err(|e| DatabaseError::decode("installment_number", e))?;
    sqlx::query(
        r#"
        INSERT INTO repayment_schedules (
            id, loan_id, installment_number, due_date, expected_amount, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::from(schedule.id))
    .bind(Uuid::from(schedule.loan_id))
    .bind(installment_number)
    .bind(schedule.due_date)
    .bind(schedule.expected_amount.amount())
    .bind(schedule.status.as_str())
    .bind(schedule.created_at)
    .bind(schedule.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rewrites one cached status; returns false if the installment does not exist
pub async fn update_schedule_status(
    conn: &mut PgConnection,
    schedule_id: ScheduleId,
    status: ScheduleStatus,
    updated_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query("UPDATE repayment_schedules SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(Uuid::from(schedule_id))
        .bind(status.as_str())
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

// ============================================================================
// Payments
// ============================================================================

pub async fn fetch_payment(
    conn: &mut PgConnection,
    id: PaymentId,
    for_update: bool,
) -> Result<Option<Payment>, DatabaseError> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row: Option<PaymentRow> = sqlx::query_as(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn fetch_payments(conn: &mut PgConnection, loan_id: LoanId) -> Result<Vec<Payment>, DatabaseError> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE loan_id = $1 ORDER BY created_at, receipt_number"
    );
    let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
        .bind(Uuid::from(loan_id))
        .fetch_all(&mut *conn)
        .await?;
    convert_all(rows)
}

/// Payments on the loans `fetch_loans(scope, false)` would return
pub async fn fetch_scoped_payments(
    conn: &mut PgConnection,
    scope: MarketScope,
) -> Result<Vec<Payment>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM payments p JOIN loans l ON l.id = p.loan_id \
         WHERE l.removed_at IS NULL AND ($1::uuid IS NULL OR l.market_id = $1) \
         ORDER BY p.created_at, p.receipt_number",
        qualified("p", PAYMENT_COLUMNS)
    );
    let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
        .bind(scope.market_id().map(Uuid::from))
        .fetch_all(&mut *conn)
        .await?;
    convert_all(rows)
}

pub async fn insert_payment(conn: &mut PgConnection, payment: &Payment) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, receipt_number, loan_id, schedule_id, amount, payment_date, method,
            is_verified, verified_by, verified_at, notes, recorded_by, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(Uuid::from(payment.id))
    .bind(payment.receipt_number.to_string())
    .bind(Uuid::from(payment.loan_id))
    .bind(payment.schedule_id.map(Uuid::from))
    .bind(payment.amount.amount())
    .bind(payment.payment_date)
    .bind(payment.method.as_str())
    .bind(payment.is_verified)
    .bind(payment.verified_by.map(Uuid::from))
    .bind(payment.verified_at)
    .bind(&payment.notes)
    .bind(Uuid::from(payment.recorded_by))
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Sets the verification flag unless it is already set
///
/// Returns false when the payment was verified by someone else first.
pub async fn mark_payment_verified(conn: &mut PgConnection, payment: &Payment) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE payments SET is_verified = TRUE, verified_by = $2, verified_at = $3
        WHERE id = $1 AND is_verified = FALSE
        "#,
    )
    .bind(Uuid::from(payment.id))
    .bind(payment.verified_by.map(Uuid::from))
    .bind(payment.verified_at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ============================================================================
// Cash ledger
// ============================================================================

pub async fn fetch_scoped_ledger(
    conn: &mut PgConnection,
    scope: MarketScope,
) -> Result<Vec<CashLedgerEntry>, DatabaseError> {
    let sql = format!(
        "SELECT {LEDGER_COLUMNS} FROM cash_ledger \
         WHERE ($1::uuid IS NULL OR market_id = $1) \
         ORDER BY transaction_date, reference_number"
    );
    let rows: Vec<LedgerRow> = sqlx::query_as(&sql)
        .bind(scope.market_id().map(Uuid::from))
        .fetch_all(&mut *conn)
        .await?;
    convert_all(rows)
}

pub async fn insert_ledger_entry(conn: &mut PgConnection, entry: &CashLedgerEntry) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO cash_ledger (
            id, reference_number, transaction_type, amount, loan_id, payment_id, market_id,
            transaction_date, description, recorded_by, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(Uuid::from(entry.id))
    .bind(entry.reference_number.to_string())
    .bind(entry.transaction_type.as_str())
    .bind(entry.amount.amount())
    .bind(entry.loan_id.map(Uuid::from))
    .bind(entry.payment_id.map(Uuid::from))
    .bind(entry.market_id.map(Uuid::from))
    .bind(entry.transaction_date)
    .bind(&entry.description)
    .bind(Uuid::from(entry.recorded_by))
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Audit trail
// ============================================================================

pub async fn fetch_activities(
    conn: &mut PgConnection,
    loan_id: LoanId,
) -> Result<Vec<LoanActivity>, DatabaseError> {
    let rows: Vec<ActivityRow> = sqlx::query_as(
        r#"
        SELECT id, loan_id, actor, action, description, metadata, created_at
        FROM loan_activities
        WHERE loan_id = $1
        ORDER BY seq
        "#,
    )
    .bind(Uuid::from(loan_id))
    .fetch_all(&mut *conn)
    .await?;
    convert_all(rows)
}

pub async fn insert_activity(conn: &mut PgConnection, activity: &LoanActivity) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO loan_activities (id, loan_id, actor, action, description, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(activity.id))
    .bind(Uuid::from(activity.loan_id))
    .bind(Uuid::from(activity.actor))
    .bind(activity.action.as_str())
    .bind(&activity.description)
    .bind(&activity.metadata)
    .bind(activity.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Prefixes every column in a comma-separated list with a table alias
fn qualified(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
