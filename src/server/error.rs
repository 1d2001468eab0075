use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Error binding to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Monitor error: {0}")]
    Monitor(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
