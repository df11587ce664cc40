//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or validating protocol data.
///
/// Every decoding variant means the same thing to the transport: the frame is
/// malformed and must be dropped. The variants only differ in the diagnostic
/// they carry into the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not well-formed JSON.
    #[error("malformed frame: invalid JSON: {0}")]
    InvalidJson(String),

    /// Payload is JSON but not an object.
    #[error("malformed frame: expected a JSON object")]
    NotAnObject,

    /// Required field is absent.
    #[error("malformed frame: missing field `{0}`")]
    MissingField(&'static str),

    /// Field is present but has the wrong shape.
    #[error("malformed frame: invalid field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Known frame type whose body failed validation.
    #[error("malformed {kind} frame: {reason}")]
    InvalidPayload {
        /// Frame type from the `type` field
        kind: &'static str,
        /// Underlying decoder message
        reason: String,
    },

    /// Request payload violates a protocol rule before it is sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Returns true if this error describes a malformed inbound frame.
    ///
    /// Malformed frames are recovered locally (dropped and logged) and never
    /// affect the connection.
    pub fn is_malformed_frame(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_) | Self::Encode(_))
    }
}
