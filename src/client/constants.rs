//! Constants used throughout the client application

/// Payload sent with every `unpack_data` call unless overridden
pub const DEFAULT_PAYLOAD: &str = "address:10.0.0.50;message:這是加密數據";

/// Progress bar tick interval in milliseconds
pub const PROGRESS_TICK_INTERVAL_MS: u64 = 100;

/// Live statistics update interval in milliseconds
pub const LIVE_STATS_UPDATE_INTERVAL_MS: u64 = 500;

/// Histogram lower bound in nanoseconds
pub const HISTOGRAM_LOW_BOUND_NS: u64 = 100;

/// Histogram upper bound in nanoseconds
pub const HISTOGRAM_HIGH_BOUND_NS: u64 = 1_000_000_000;

/// Histogram significant digits for precision
pub const HISTOGRAM_SIGNIFICANT_DIGITS: u8 = 3;

/// Pass threshold for mean call latency in milliseconds
pub const PASS_THRESHOLD_MS: f64 = 1.0;

/// Excellent latency threshold in milliseconds
pub const EXCELLENT_LATENCY_MS: f64 = 0.5;

/// Acceptable latency threshold in milliseconds
pub const ACCEPTABLE_LATENCY_MS: f64 = 1.0;
