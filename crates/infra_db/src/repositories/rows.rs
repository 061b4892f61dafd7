//! Row types and their mapping to domain types
//!
//! Enumerations are stored as their snake_case codes and parsed back with
//! `FromStr`; a value the domain does not recognise is reported as a corrupt
//! row rather than silently defaulted.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{Money, Rate};
use domain_ledger::CashLedgerEntry;
use domain_lending::{Borrower, LoanActivity, Loan, Market, Payment, RepaymentSchedule};

use crate::error::DatabaseError;

fn parse<T>(column: &str, value: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| DatabaseError::decode(column, e))
}

fn to_u32(column: &str, value: i32) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|e| DatabaseError::decode(column, e))
}

#[derive(Debug, Clone, FromRow)]
pub struct MarketRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<MarketRow> for Market {
    fn from(row: MarketRow) -> Self {
        Market {
            id: row.id.into(),
            code: row.code,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BorrowerRow {
    pub id: Uuid,
    pub market_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub national_id: Option<String>,
    pub is_active: bool,
    pub registered_by: Uuid,
    pub registered_at: DateTime<Utc>,
}

impl From<BorrowerRow> for Borrower {
    fn from(row: BorrowerRow) -> Self {
        Borrower {
            id: row.id.into(),
            market_id: row.market_id.into(),
            full_name: row.full_name,
            phone: row.phone,
            national_id: row.national_id,
            is_active: row.is_active,
            registered_by: row.registered_by.into(),
            registered_at: row.registered_at,
        }
    }
}

pub const LOAN_COLUMNS: &str = "id, loan_number, borrower_id, market_id, principal_amount, \
     interest_rate, interest_amount, total_amount, duration_days, frequency, purpose, status, \
     applied_by, approved_by, approved_at, rejected_by, rejected_at, rejection_reason, \
     disbursement_date, due_date, disbursed_by, completed_at, closed_at, closure_reason, \
     removed_at, version, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct LoanRow {
    pub id: Uuid,
    pub loan_number: String,
    pub borrower_id: Uuid,
    pub market_id: Uuid,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    pub interest_amount: Decimal,
    pub total_amount: Decimal,
    pub duration_days: i32,
    pub frequency: String,
    pub purpose: Option<String>,
    pub status: String,
    pub applied_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub disbursement_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub disbursed_by: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closure_reason: Option<String>,
    pub removed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = DatabaseError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: row.id.into(),
            loan_number: parse("loan_number", &row.loan_number)?,
            borrower_id: row.borrower_id.into(),
            market_id: row.market_id.into(),
            principal_amount: Money::new(row.principal_amount),
            interest_rate: Rate::new(row.interest_rate),
            interest_amount: Money::new(row.interest_amount),
            total_amount: Money::new(row.total_amount),
            duration_days: to_u32("duration_days", row.duration_days)?,
            frequency: parse("frequency", &row.frequency)?,
            purpose: row.purpose,
            status: parse("status", &row.status)?,
            applied_by: row.applied_by.into(),
            approved_by: row.approved_by.map(Into::into),
            approved_at: row.approved_at,
            rejected_by: row.rejected_by.map(Into::into),
            rejected_at: row.rejected_at,
            rejection_reason: row.rejection_reason,
            disbursement_date: row.disbursement_date,
            due_date: row.due_date,
            disbursed_by: row.disbursed_by.map(Into::into),
            completed_at: row.completed_at,
            closed_at: row.closed_at,
            closure_reason: row.closure_reason,
            removed_at: row.removed_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub const SCHEDULE_COLUMNS: &str =
    "id, loan_id, installment_number, due_date, expected_amount, status, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub installment_number: i32,
    pub due_date: NaiveDate,
    pub expected_amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for RepaymentSchedule {
    type Error = DatabaseError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(RepaymentSchedule {
            id: row.id.into(),
            loan_id: row.loan_id.into(),
            installment_number: to_u32("installment_number", row.installment_number)?,
            due_date: row.due_date,
            expected_amount: Money::new(row.expected_amount),
            status: parse("status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub const PAYMENT_COLUMNS: &str = "id, receipt_number, loan_id, schedule_id, amount, payment_date, \
     method, is_verified, verified_by, verified_at, notes, recorded_by, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub receipt_number: String,
    pub loan_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: String,
    pub is_verified: bool,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id.into(),
            receipt_number: parse("receipt_number", &row.receipt_number)?,
            loan_id: row.loan_id.into(),
            schedule_id: row.schedule_id.map(Into::into),
            amount: Money::new(row.amount),
            payment_date: row.payment_date,
            method: parse("method", &row.method)?,
            is_verified: row.is_verified,
            verified_by: row.verified_by.map(Into::into),
            verified_at: row.verified_at,
            notes: row.notes,
            recorded_by: row.recorded_by.into(),
            created_at: row.created_at,
        })
    }
}

pub const LEDGER_COLUMNS: &str = "id, reference_number, transaction_type, amount, loan_id, \
     payment_id, market_id, transaction_date, description, recorded_by, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
    pub id: Uuid,
    pub reference_number: String,
    pub transaction_type: String,
    pub amount: Decimal,
    pub loan_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub market_id: Option<Uuid>,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for CashLedgerEntry {
    type Error = DatabaseError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(CashLedgerEntry {
            id: row.id.into(),
            reference_number: parse("reference_number", &row.reference_number)?,
            transaction_type: parse("transaction_type", &row.transaction_type)?,
            amount: Money::new(row.amount),
            loan_id: row.loan_id.map(Into::into),
            payment_id: row.payment_id.map(Into::into),
            market_id: row.market_id.map(Into::into),
            transaction_date: row.transaction_date,
            description: row.description,
            recorded_by: row.recorded_by.into(),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub actor: Uuid,
    pub action: String,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for LoanActivity {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(LoanActivity {
            id: row.id.into(),
            loan_id: row.loan_id.into(),
            actor: row.actor.into(),
            action: parse("action", &row.action)?,
            description: row.description,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

/// Converts every row, failing on the first corrupt one
pub fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_lending::{LoanStatus, RepaymentFrequency};
    use rust_decimal_macros::dec;

    fn loan_row() -> LoanRow {
        let now = Utc::now();
        LoanRow {
            id: Uuid::now_v7(),
            loan_number: "LN-20240101-0001".to_string(),
            borrower_id: Uuid::new_v4(),
            market_id: Uuid::new_v4(),
            principal_amount: dec!(10000),
            interest_rate: dec!(0.10),
            interest_amount: dec!(1000),
            total_amount: dec!(11000),
            duration_days: 10,
            frequency: "bi_weekly".to_string(),
            purpose: None,
            status: "written_off".to_string(),
            applied_by: Uuid::new_v4(),
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            disbursement_date: None,
            due_date: None,
            disbursed_by: None,
            completed_at: None,
            closed_at: None,
            closure_reason: None,
            removed_at: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_loan_row_maps_codes() {
        let loan = Loan::try_from(loan_row()).unwrap();

        assert_eq!(loan.loan_number.to_string(), "LN-20240101-0001");
        assert_eq!(loan.frequency, RepaymentFrequency::BiWeekly);
        assert_eq!(loan.status, LoanStatus::WrittenOff);
        assert_eq!(loan.interest_rate.as_percentage(), dec!(10.00));
        assert_eq!(loan.version, 3);
    }

    #[test]
    fn test_unknown_status_is_a_decode_error() {
        let mut row = loan_row();
        row.status = "archived".to_string();

        assert!(matches!(Loan::try_from(row), Err(DatabaseError::Decode(_))));
    }

    #[test]
    fn test_negative_installment_number_is_rejected() {
        let now = Utc::now();
        let row = ScheduleRow {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            installment_number: -1,
            due_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            expected_amount: dec!(1100),
            status: "pending".to_string(),
            created_at: now,
            updated_at: now,
        };

        assert!(RepaymentSchedule::try_from(row).is_err());
    }
}
