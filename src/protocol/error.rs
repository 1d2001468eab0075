use thiserror::Error;

/// Protocol-level errors for HTTP framing and XML-RPC encoding/decoding
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed XML at byte {offset}: {reason}")]
    MalformedXml { offset: usize, reason: String },

    #[error("Unexpected element: expected {expected}, found {found}")]
    UnexpectedElement { expected: String, found: String },

    #[error("Invalid {kind} value: {text:?}")]
    InvalidScalar { kind: &'static str, text: String },

    #[error("Values nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("Unknown value type <{0}>")]
    UnknownType(String),

    #[error("Malformed HTTP message: {0}")]
    MalformedHttp(String),

    #[error("HTTP header section exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("HTTP body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("Missing Content-Length header")]
    MissingContentLength,

    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),
}

impl ProtocolError {
    /// Returns true if the error comes from the XML layer rather than the
    /// document structure, i.e. the body is not well-formed XML at all.
    pub fn is_malformed_xml(&self) -> bool {
        matches!(self, ProtocolError::MalformedXml { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
