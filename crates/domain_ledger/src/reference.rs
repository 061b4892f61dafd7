//! Human-readable reference numbers
//!
//! References have the shape `PREFIX-YYYYMMDD-NNNN`, with the sequence
//! restarting at 1 for every (prefix, day) pair. Allocation must happen in the
//! same critical section as the insert it numbers, otherwise two concurrent
//! requests on the same day can be issued the same reference.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Sequence namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferencePrefix {
    /// Loan numbers
    Loan,
    /// Payment receipts
    Receipt,
    /// Cash ledger entries
    Cash,
}

impl ReferencePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferencePrefix::Loan => "LN",
            ReferencePrefix::Receipt => "RCP",
            ReferencePrefix::Cash => "CSH",
        }
    }
}

impl FromStr for ReferencePrefix {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LN" => Ok(ReferencePrefix::Loan),
            "RCP" => Ok(ReferencePrefix::Receipt),
            "CSH" => Ok(ReferencePrefix::Cash),
            other => Err(LedgerError::InvalidReference(format!("unknown prefix '{}'", other))),
        }
    }
}

/// A formatted reference such as `RCP-20240115-0003`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceNumber {
    prefix: ReferencePrefix,
    date: NaiveDate,
    sequence: u32,
}

impl ReferenceNumber {
    pub fn new(prefix: ReferencePrefix, date: NaiveDate, sequence: u32) -> Self {
        Self { prefix, date, sequence }
    }

    pub fn prefix(&self) -> ReferencePrefix {
        self.prefix
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.prefix.as_str(),
            self.date.format("%Y%m%d"),
            self.sequence
        )
    }
}

impl FromStr for ReferenceNumber {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidReference(s.to_string());

        let mut parts = s.splitn(3, '-');
        let prefix = parts.next().ok_or_else(invalid)?.parse()?;
        let date = parts
            .next()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
            .ok_or_else(invalid)?;
        let sequence = parts
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(invalid)?;

        Ok(Self { prefix, date, sequence })
    }
}

impl Serialize for ReferenceNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReferenceNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// In-process sequence allocator
///
/// Callers hold it behind the same lock that guards the records being
/// numbered. The PostgreSQL adapter keeps the equivalent counters in a table.
#[derive(Debug, Default, Clone)]
pub struct ReferenceSequencer {
    last: HashMap<(ReferencePrefix, NaiveDate), u32>,
}

impl ReferenceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next reference for `prefix` on `date`
    pub fn next(&mut self, prefix: ReferencePrefix, date: NaiveDate) -> ReferenceNumber {
        let counter = self.last.entry((prefix, date)).or_insert(0);
        *counter += 1;
        ReferenceNumber::new(prefix, date, *counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_restarts_per_day_and_prefix() {
        let mut seq = ReferenceSequencer::new();
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();

        assert_eq!(seq.next(ReferencePrefix::Receipt, d1).to_string(), "RCP-20240115-0001");
        assert_eq!(seq.next(ReferencePrefix::Receipt, d1).to_string(), "RCP-20240115-0002");
        assert_eq!(seq.next(ReferencePrefix::Cash, d1).to_string(), "CSH-20240115-0001");
        assert_eq!(seq.next(ReferencePrefix::Receipt, d2).to_string(), "RCP-20240116-0001");
    }

    #[test]
    fn test_parse_roundtrip() {
        let reference: ReferenceNumber = "LN-20240301-0042".parse().unwrap();
        assert_eq!(reference.prefix(), ReferencePrefix::Loan);
        assert_eq!(reference.sequence(), 42);
        assert_eq!(reference.to_string(), "LN-20240301-0042");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("LN-2024-0001".parse::<ReferenceNumber>().is_err());
        assert!("XX-20240301-0001".parse::<ReferenceNumber>().is_err());
        assert!("LN-20240301-0000".parse::<ReferenceNumber>().is_err());
    }
}
