//! Ledger entry types
//!
//! Entries are created from a [`NewLedgerEntry`], which fixes the sign of the
//! amount from the transaction type. The reference number and identifier are
//! assigned by whoever appends the entry, inside the same critical section.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ActorId, LedgerEntryId, LoanId, MarketId, Money, PaymentId};

use crate::error::LedgerError;
use crate::reference::ReferenceNumber;

/// Kind of cash movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Owner capital added to the float
    CapitalInjection,
    /// Operating expense paid out
    Expense,
    /// Repayment received from a borrower
    Payment,
    /// Principal released to a borrower
    Disbursement,
}

impl TransactionType {
    /// Returns true if this type of movement brings money in
    pub fn is_inflow(&self) -> bool {
        matches!(self, TransactionType::CapitalInjection | TransactionType::Payment)
    }

    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::CapitalInjection => "capital_injection",
            TransactionType::Expense => "expense",
            TransactionType::Payment => "payment",
            TransactionType::Disbursement => "disbursement",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capital_injection" => Ok(TransactionType::CapitalInjection),
            "expense" => Ok(TransactionType::Expense),
            "payment" => Ok(TransactionType::Payment),
            "disbursement" => Ok(TransactionType::Disbursement),
            other => Err(LedgerError::UnknownTransactionType(other.to_string())),
        }
    }
}

/// A cash movement waiting to be appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub transaction_type: TransactionType,
    /// Signed amount; the sign always agrees with `transaction_type`
    pub amount: Money,
    pub loan_id: Option<LoanId>,
    pub payment_id: Option<PaymentId>,
    pub market_id: Option<MarketId>,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub recorded_by: ActorId,
}

impl NewLedgerEntry {
    /// Builds an entry from a positive magnitude, applying the sign of the
    /// transaction type
    ///
    /// # Errors
    ///
    /// Returns an error if `magnitude` is not strictly positive or the
    /// description is blank
    pub fn new(
        transaction_type: TransactionType,
        magnitude: Money,
        transaction_date: NaiveDate,
        description: impl Into<String>,
        recorded_by: ActorId,
    ) -> Result<Self, LedgerError> {
        let magnitude = Money::positive(magnitude.amount())?;
        let description = description.into();
        if description.trim().is_empty() {
            return Err(LedgerError::MissingDescription);
        }

        let amount = if transaction_type.is_inflow() {
            magnitude
        } else {
            -magnitude
        };

        Ok(Self {
            transaction_type,
            amount,
            loan_id: None,
            payment_id: None,
            market_id: None,
            transaction_date,
            description,
            recorded_by,
        })
    }

    /// Owner capital added to the float
    pub fn capital_injection(
        amount: Money,
        date: NaiveDate,
        description: impl Into<String>,
        recorded_by: ActorId,
    ) -> Result<Self, LedgerError> {
        Self::new(TransactionType::CapitalInjection, amount, date, description, recorded_by)
    }

    /// Operating expense paid out
    pub fn expense(
        amount: Money,
        date: NaiveDate,
        description: impl Into<String>,
        recorded_by: ActorId,
    ) -> Result<Self, LedgerError> {
        Self::new(TransactionType::Expense, amount, date, description, recorded_by)
    }

    /// Principal released for a loan
    pub fn disbursement(
        loan_id: LoanId,
        market_id: MarketId,
        principal: Money,
        date: NaiveDate,
        description: impl Into<String>,
        recorded_by: ActorId,
    ) -> Result<Self, LedgerError> {
        let entry = Self::new(TransactionType::Disbursement, principal, date, description, recorded_by)?;
        Ok(entry.for_loan(loan_id, market_id))
    }

    /// Repayment received against a loan
    pub fn repayment(
        loan_id: LoanId,
        market_id: MarketId,
        payment_id: PaymentId,
        amount: Money,
        date: NaiveDate,
        description: impl Into<String>,
        recorded_by: ActorId,
    ) -> Result<Self, LedgerError> {
        let mut entry = Self::new(TransactionType::Payment, amount, date, description, recorded_by)?;
        entry.payment_id = Some(payment_id);
        Ok(entry.for_loan(loan_id, market_id))
    }

    /// Links the entry to a loan; the entry inherits the loan's market
    pub fn for_loan(mut self, loan_id: LoanId, market_id: MarketId) -> Self {
        self.loan_id = Some(loan_id);
        self.market_id = Some(market_id);
        self
    }

    /// Tags an unlinked entry with a market
    pub fn in_market(mut self, market_id: Option<MarketId>) -> Self {
        self.market_id = market_id;
        self
    }
}

/// An appended, immutable cash ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashLedgerEntry {
    pub id: LedgerEntryId,
    pub reference_number: ReferenceNumber,
    pub transaction_type: TransactionType,
    /// Signed amount: positive is inflow, negative is outflow
    pub amount: Money,
    pub loan_id: Option<LoanId>,
    pub payment_id: Option<PaymentId>,
    pub market_id: Option<MarketId>,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub recorded_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl CashLedgerEntry {
    /// Materializes a pending entry with its assigned id and reference
    pub fn from_new(
        new: NewLedgerEntry,
        id: LedgerEntryId,
        reference_number: ReferenceNumber,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            reference_number,
            transaction_type: new.transaction_type,
            amount: new.amount,
            loan_id: new.loan_id,
            payment_id: new.payment_id,
            market_id: new.market_id,
            transaction_date: new.transaction_date,
            description: new.description,
            recorded_by: new.recorded_by,
            created_at,
        }
    }
}
