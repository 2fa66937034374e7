//! Ledger HTTP server binary

use anyhow::Context;
use dotenv::dotenv;
use ledger_core::{logging::init_logging, runtime::Runtime, Config};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let log_sink = init_logging(&config.logger).context("Failed to initialize logging")?;

    info!(
        delivery = ?config.ledger.delivery,
        file_sink = log_sink.has_file(),
        "Starting ledger server"
    );

    let runtime = Runtime::start(config, log_sink)
        .await
        .context("Failed to start ledger")?;

    let served = runtime.serve().await;
    let report = runtime.shutdown().await;

    served.context("HTTP server failed")?;
    if !report.is_clean() {
        anyhow::bail!("Teardown incomplete: {}", report);
    }

    Ok(())
}
