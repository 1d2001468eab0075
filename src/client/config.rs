use crate::client::constants::DEFAULT_PAYLOAD;
use crate::client::error::{ClientError, Result};
use clap::Parser;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug, Clone)]
#[command(name = "pulse-client")]
#[command(about = "Drives unpack_data calls over one keep-alive connection and reports latency")]
pub struct Config {
    /// Server address to connect to
    #[arg(long, default_value = "127.0.0.1:50002")]
    pub server: String,

    /// Number of calls to make during the test
    #[arg(long, default_value_t = 10000)]
    pub calls: usize,

    /// Number of warmup calls before the test
    #[arg(long, default_value_t = 200)]
    pub warmup: usize,

    /// Dashboard update interval (calls)
    #[arg(long, default_value_t = 100)]
    pub update: usize,

    /// Socket read timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// String parameter sent with every call
    #[arg(long, default_value = DEFAULT_PAYLOAD)]
    pub payload: String,

    /// Disable the progress display (useful for non-interactive environments)
    #[arg(long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,
}

impl Config {
    /// Returns the configured timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns true if JSON format logging is enabled
    pub fn is_json_format(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");
        if self.calls == 0 {
            return Err(ClientError::Config("calls must be > 0".into()));
        }
        if self.update == 0 {
            return Err(ClientError::Config("update must be > 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::Config("timeout must be > 0".into()));
        }
        debug!("Configuration validated successfully");
        Ok(())
    }
}
