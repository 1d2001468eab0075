use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pulse::client::{
    measurement_phase, warmup_phase, Config, HttpTransport, Reporter, RpcTransport, Statistics,
};
use pulse::logging::init_logging_with_config;
use pulse::protocol::{MethodCall, Value, UNPACK_DATA_METHOD};
use tracing::{error, info};

fn main() {
    let config = Config::parse();

    init_logging_with_config(&config.log_level, config.is_json_format());

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        error!(error = %e, "Benchmark failed");
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    let mut transport = HttpTransport::connect(&config.server)
        .with_context(|| format!("Failed to connect to {}", config.server))?;
    transport.set_timeout(config.timeout())?;

    let call = MethodCall::new(UNPACK_DATA_METHOD, vec![Value::from(config.payload.as_str())]);

    if !config.quiet {
        println!("{}", "unpack_data Latency Benchmark".bold());
        println!("Server: {}\n", config.server);
    }

    // A fault here means the server does not speak unpack_data at all.
    let reply = transport
        .invoke(&call)
        .context("Initial unpack_data call failed")?;
    info!(reply = reply.type_name(), "Server reachable");

    warmup_phase(&mut transport, &call, config.warmup, config.quiet)?;

    let result = measurement_phase(
        &mut transport,
        &call,
        config.calls,
        config.update,
        config.quiet,
    )?;

    let stats = Statistics::new(&result.latencies)?;
    Reporter.print_results(&stats, &result)?;

    Ok(())
}
