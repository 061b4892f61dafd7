//! Lending dashboard binary
//!
//! Prints the dashboard summary as JSON on stdout.
//!
//! ```bash
//! LENDING_DATABASE_URL=postgres://localhost/lending \
//! LENDING_MARKET=<market uuid> \
//! LENDING_AS_OF=2024-01-31 \
//!     cargo run --bin lending-dashboard
//! ```

use interface_cli::{init_tracing, run, DashboardConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let config = DashboardConfig::from_env()?;
    init_tracing(&config.log_level, config.log_json);

    let summary = run(&config).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
