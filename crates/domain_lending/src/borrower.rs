//! Borrowers and the markets they trade in
//!
//! A market is the unit of multi-tenant scoping: every borrower belongs to
//! exactly one, and loans inherit their borrower's market.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{ActorId, BorrowerId, MarketId};

use crate::error::LendingError;

/// A trading location served by the business
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    /// Short unique code, stored upper-case
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Market {
    /// Creates a market
    ///
    /// # Errors
    ///
    /// Returns a validation error if the code or name is blank
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        let code = code.into().trim().to_ascii_uppercase();
        let name = name.into().trim().to_string();
        if code.is_empty() {
            return Err(LendingError::validation("market code must not be blank"));
        }
        if name.is_empty() {
            return Err(LendingError::validation("market name must not be blank"));
        }

        Ok(Self {
            id: MarketId::new_v7(),
            code,
            name,
            created_at: now,
        })
    }
}

/// Borrower registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BorrowerRegistration {
    pub market_id: MarketId,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(max = 40))]
    pub national_id: Option<String>,
}

/// A registered borrower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: BorrowerId,
    pub market_id: MarketId,
    pub full_name: String,
    /// Phone number with separators stripped; unique within a market
    pub phone: String,
    pub national_id: Option<String>,
    pub is_active: bool,
    pub registered_by: ActorId,
    pub registered_at: DateTime<Utc>,
}

impl Borrower {
    /// Validates a registration and builds the borrower record
    ///
    /// Phone uniqueness is checked by the store, which sees every borrower in
    /// the market.
    pub fn register(
        registration: BorrowerRegistration,
        registered_by: ActorId,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        registration.validate()?;

        let full_name = registration.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(LendingError::validation("borrower name must not be blank"));
        }

        let phone = normalize_phone(&registration.phone);
        if phone.len() < 7 {
            return Err(LendingError::validation(format!(
                "phone number '{}' is too short",
                registration.phone
            )));
        }

        Ok(Self {
            id: BorrowerId::new_v7(),
            market_id: registration.market_id,
            full_name,
            phone,
            national_id: registration
                .national_id
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            is_active: true,
            registered_by,
            registered_at: now,
        })
    }
}

/// Strips spaces, dashes and parentheses, keeping a leading `+`
pub fn normalize_phone(raw: &str) -> String {
    raw.trim()
        .chars()
        .enumerate()
        .filter(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '+'))
        .map(|(_, c)| c)
        .collect()
}
