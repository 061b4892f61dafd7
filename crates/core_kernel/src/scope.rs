//! Market scoping for multi-tenant reads

use serde::{Deserialize, Serialize};

use crate::identifiers::MarketId;

/// Restricts a query to one market, or leaves it portfolio-wide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "market_id")]
pub enum MarketScope {
    /// Every market
    #[default]
    All,
    /// A single market
    Market(MarketId),
}

impl MarketScope {
    /// Builds a scope from an optional market filter
    pub fn from_option(market: Option<MarketId>) -> Self {
        market.map_or(MarketScope::All, MarketScope::Market)
    }

    /// Returns true if a record tagged with `market` falls inside this scope
    ///
    /// Untagged records are only visible to portfolio-wide queries.
    pub fn includes(&self, market: Option<MarketId>) -> bool {
        match self {
            MarketScope::All => true,
            MarketScope::Market(scope) => market == Some(*scope),
        }
    }

    /// Returns the market this scope is restricted to, if any
    pub fn market_id(&self) -> Option<MarketId> {
        match self {
            MarketScope::All => None,
            MarketScope::Market(id) => Some(*id),
        }
    }
}
