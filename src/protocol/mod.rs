//! Protocol module: XML-RPC values and messages over HTTP/1.1

pub mod error;
pub mod http;
pub mod message;
pub mod value;
pub mod xml;

pub use error::{ProtocolError, Result as ProtocolResult};
pub use http::{ParseResult, Request, Response, Version};
pub use message::{Fault, MethodCall, MethodResponse};
pub use value::Value;

/// Port the server listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 50002;

/// Name of the single method exposed by the server
pub const UNPACK_DATA_METHOD: &str = "unpack_data";

/// Literal token returned (inside a one-element array) by `unpack_data`
pub const ACKNOWLEDGEMENT: &str = "OK";

/// Request path used by the client; the server accepts any path
pub const RPC_PATH: &str = "/RPC2";
