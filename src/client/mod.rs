//! Latency benchmark client for the `unpack_data` service

pub mod config;
pub mod constants;
pub mod error;
pub mod measurement;
pub mod progress;
pub mod reporter;
pub mod statistics;
pub mod transport;

pub use config::Config;
pub use constants::*;
pub use error::{ClientError, Result};
pub use measurement::{measure_single_call, measurement_phase, warmup_phase, MeasurementResult};
pub use progress::ProgressTracker;
pub use reporter::Reporter;
pub use statistics::{LatencySummary, Statistics};
pub use transport::{HttpTransport, RpcTransport};
