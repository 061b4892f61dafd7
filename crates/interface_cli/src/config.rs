//! Dashboard configuration
//!
//! Read from `LENDING_*` environment variables, e.g. `LENDING_DATABASE_URL`,
//! `LENDING_MARKET`, `LENDING_AS_OF=2024-01-31`.

use chrono::NaiveDate;
use serde::Deserialize;

use core_kernel::{MarketId, MarketScope, Timezone};

const ENV_PREFIX: &str = "LENDING";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    pub max_connections: u32,
    /// Restrict every figure to one market
    pub market: Option<String>,
    /// Report date; defaults to today in `timezone`
    pub as_of: Option<NaiveDate>,
    /// Timezone that decides the business date
    pub timezone: Timezone,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/lending".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            max_connections: 5,
            market: None,
            as_of: None,
            timezone: Timezone::default(),
        }
    }
}

impl DashboardConfig {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(environment())
    }

    /// Loads configuration from the given variables instead of the process
    /// environment
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::from_environment(environment().source(Some(map)))
    }

    fn from_environment(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// The market scope named by `market`
    pub fn scope(&self) -> Result<MarketScope, config::ConfigError> {
        match self.market.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(MarketScope::All),
            Some(raw) => raw
                .parse::<MarketId>()
                .map(MarketScope::Market)
                .map_err(|e| config::ConfigError::Message(format!("invalid market id '{raw}': {e}"))),
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}
