//! Lending dashboard
//!
//! Loads [`DashboardConfig`], connects to PostgreSQL and computes the
//! dashboard summary for one market or the whole portfolio.

pub mod config;

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{AdapterHealth, HealthCheckable, SystemClock};
use domain_reporting::{DashboardSummary, ReportingService};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLendingStore};

pub use crate::config::DashboardConfig;

/// Installs the global tracing subscriber
///
/// `RUST_LOG` wins over `log_level` when both are set.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

/// Connects, migrates and computes the dashboard
pub async fn run(config: &DashboardConfig) -> anyhow::Result<DashboardSummary> {
    let scope = config.scope()?;

    let pool = create_pool(
        DatabaseConfig::new(config.database_url.clone()).max_connections(config.max_connections),
    )
    .await
    .context("connecting to the lending database")?;
    run_migrations(&pool).await.context("applying migrations")?;

    let store = PostgresLendingStore::new(pool);
    let health = store.health_check().await;
    if health.status != AdapterHealth::Healthy {
        warn!(adapter = %health.adapter_id, message = ?health.message, "Store unhealthy");
        bail!(
            "store {} is unhealthy: {}",
            health.adapter_id,
            health.message.unwrap_or_default()
        );
    }

    let reporting = ReportingService::new(Arc::new(store), Arc::new(SystemClock::new(config.timezone)));
    let summary = reporting
        .dashboard(config.as_of, scope)
        .await
        .context("computing dashboard")?;

    info!(as_of = %summary.as_of, "Dashboard computed");
    Ok(summary)
}
