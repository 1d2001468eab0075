use crate::protocol::{Fault, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server returned {0}")]
    Fault(Fault),

    #[error("Server responded with HTTP {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Measurement error: {0}")]
    Measurement(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// True for read timeouts, which the measurement loop counts as failed calls
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ClientError::Io(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
