//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding device traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit in a single frame.
    #[error("payload too large: maximum {max} bytes, got {actual}")]
    PayloadTooLarge {
        /// Maximum allowed length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// Protobuf decoding failed.
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Application port number this crate does not know how to interpret.
    #[error("unknown application port: {0}")]
    UnknownPort(i32),
}
