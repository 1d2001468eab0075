//! Server module for the Pulse XML-RPC responder

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod monitor;
pub mod registry;
pub mod service;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use handler::{CallGap, Clock, SystemClock, TimedEchoHandler};
pub use monitor::{ServerCounters, ServerMonitor, ServerStats};
pub use registry::{default_registry, MethodRegistry, RpcMethod};
pub use service::Server;
