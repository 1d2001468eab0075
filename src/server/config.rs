//! Server configuration module
//!
//! Provides CLI argument parsing and validation for the Pulse server.

use crate::protocol::DEFAULT_PORT;
use crate::server::error::{Result, ServerError};
use clap::Parser;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug, Clone)]
#[command(name = "pulse-server")]
#[command(about = "XML-RPC responder that acknowledges unpack_data calls and reports inter-call timing")]
pub struct ServerConfig {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Bind port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interval between latency summary log lines in seconds (0 disables them)
    #[arg(long, default_value_t = 10)]
    pub stats_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,
}

impl ServerConfig {
    /// Returns the full bind address as a string (bind:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Returns the summary interval, or None when summaries are disabled
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval > 0).then(|| Duration::from_secs(self.stats_interval))
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<()> {
        debug!("Validating server configuration");

        if self.port == 0 {
            return Err(ServerError::Config("port must be > 0".into()));
        }

        if self.bind.trim().is_empty() {
            return Err(ServerError::Config("bind address must not be empty".into()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ServerError::Config(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        debug!("Server configuration validated successfully");
        Ok(())
    }

    /// Returns true if JSON format logging is enabled
    pub fn is_json_format(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}
