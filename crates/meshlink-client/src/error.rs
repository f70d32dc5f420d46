//! Client error types.

use meshlink_protocol::ProtocolError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the queue, session and file transfer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No acknowledgement arrived before the packet timer fired.
    #[error("packet {id} timed out waiting for an acknowledgement")]
    Timeout { id: u32 },

    /// The device reported a routing failure for the packet.
    #[error("packet {id} failed with routing error {code}")]
    Routing { id: u32, code: i32 },

    /// The queue discarded the packet without settling it.
    #[error("packet {id} was dropped from the queue")]
    Dropped { id: u32 },

    #[error("packet id {0} is already queued")]
    DuplicatePacketId(u32),

    /// A send failed after the session had already disconnected.
    #[error("connection to the device was lost")]
    ConnectionLost,

    /// The OS random source failed or produced a degenerate draw.
    #[error("secure random source failed: {0}")]
    Csprng(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
