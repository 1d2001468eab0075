use anyhow::Result;
use clap::Parser;
use pulse::logging::init_logging_with_config;
use pulse::server::{default_registry, Server, ServerConfig, ServerMonitor};
use tracing::{error, info};

fn main() {
    // Parse CLI arguments
    let config = ServerConfig::parse();

    // Initialize structured logging with config options
    init_logging_with_config(&config.log_level, config.is_json_format());

    // Validate configuration
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        error!(error = %e, "Server failed");
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: ServerConfig) -> Result<()> {
    let monitor = ServerMonitor::new(config.stats_interval())?;
    let registry = default_registry(monitor.counters());

    let server = Server::bind(&config, registry, monitor.counters())?;

    println!("XML-RPC server running on {}...", config.port);
    info!(
        stats_interval_s = config.stats_interval,
        "Ready to accept unpack_data calls"
    );

    monitor.start_reporting();
    server.run()?;

    Ok(())
}
