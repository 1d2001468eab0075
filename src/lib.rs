//! Pulse - single-endpoint XML-RPC responder with inter-call timing
//!
//! The server answers `unpack_data(string)` with `["OK"]` and reports the
//! gap between successive calls. The client drives the server over a
//! keep-alive connection and reports round-trip latency statistics.

pub mod client;
pub mod logging;
pub mod protocol;
pub mod server;
