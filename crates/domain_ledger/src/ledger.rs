//! Append-only cash ledger
//!
//! The ledger never stores a balance. Cash-in-hand is recomputed from the
//! entries on every call.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use core_kernel::{LedgerEntryId, LoanId, MarketScope, Money};

use crate::entry::{CashLedgerEntry, NewLedgerEntry};
use crate::reference::{ReferencePrefix, ReferenceSequencer};

/// Sums every entry dated on or before `as_of` that falls inside `scope`
///
/// This is the only definition of cash-in-hand in the system; storage
/// adapters that compute it in SQL must agree with it.
pub fn cash_in_hand<'a, I>(entries: I, as_of: NaiveDate, scope: &MarketScope) -> Money
where
    I: IntoIterator<Item = &'a CashLedgerEntry>,
{
    entries
        .into_iter()
        .filter(|e| e.transaction_date <= as_of && scope.includes(e.market_id))
        .map(|e| e.amount)
        .sum()
}

/// In-memory append-only ledger
///
/// # Invariants
///
/// - Entries are never modified or removed once appended
/// - Each entry's reference number is unique per (prefix, day)
#[derive(Debug, Default, Clone)]
pub struct CashLedger {
    entries: Vec<CashLedgerEntry>,
    sequencer: ReferenceSequencer,
}

impl CashLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, allocating its id and reference number
    ///
    /// # Arguments
    ///
    /// * `entry` - The validated pending entry
    /// * `now` - Creation timestamp
    pub fn append(&mut self, entry: NewLedgerEntry, now: DateTime<Utc>) -> &CashLedgerEntry {
        let reference = self.sequencer.next(ReferencePrefix::Cash, entry.transaction_date);
        debug!(
            reference = %reference,
            transaction_type = %entry.transaction_type,
            amount = %entry.amount,
            "Appending cash ledger entry"
        );

        let idx = self.entries.len();
        self.entries
            .push(CashLedgerEntry::from_new(entry, LedgerEntryId::new_v7(), reference, now));
        &self.entries[idx]
    }

    /// All entries in append order
    pub fn entries(&self) -> &[CashLedgerEntry] {
        &self.entries
    }

    /// Entries linked to a loan
    pub fn entries_for_loan(&self, loan_id: LoanId) -> impl Iterator<Item = &CashLedgerEntry> {
        self.entries.iter().filter(move |e| e.loan_id == Some(loan_id))
    }

    /// Cash-in-hand as of a date
    pub fn cash_in_hand(&self, as_of: NaiveDate, scope: &MarketScope) -> Money {
        cash_in_hand(&self.entries, as_of, scope)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
