//! BankSim core server binary

use anyhow::Context;
use banksim_core::{Bank, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting BankSim core");

    // Config file path as first argument, environment otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    let bank = Bank::open(config).await.context("Failed to open bank")?;
    let stats = bank.stats()?;
    tracing::info!(
        customers = stats.total_customers,
        accounts = stats.total_accounts,
        transactions = stats.total_transactions,
        "Bank opened successfully"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down BankSim core");
    bank.shutdown().await?;
    Ok(())
}
