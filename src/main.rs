use clap::Parser;
use tracing_subscriber::EnvFilter;

use mos6502_bus_monitor::config::Config;
use mos6502_bus_monitor::server::run_server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;

    tracing::info!(
        memory_size = config.memory_size,
        max_breakpoints = config.max_breakpoints,
        start_address = %format!("${:04X}", config.start_address),
        free_run = config.free_run,
        "starting 6502 bus monitor"
    );
    run_server(config).await?;
    Ok(())
}
