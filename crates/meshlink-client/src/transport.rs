//! The byte-level link to the device.
//!
//! Concrete transports (serial, Bluetooth, HTTP, TCP, WebSocket) live outside
//! this crate. They implement [`Transport`] for the outbound direction and
//! hand whatever they read to
//! [`DeviceSession::handle_output`](crate::DeviceSession::handle_output) or
//! [`DeviceSession::feed`](crate::DeviceSession::feed).

use async_trait::async_trait;
use meshlink_protocol::DecodedFrame;
use thiserror::Error;

use crate::events::DeviceStatus;

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer closed or reset the link.
    ConnectionReset,
    /// The link is not in a state that accepts writes.
    InvalidState,
    /// Any other I/O failure.
    Io,
    /// The link is temporarily unable to accept data.
    Busy,
}

impl TransportErrorKind {
    /// Fatal errors end the current queue drain.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            TransportErrorKind::ConnectionReset | TransportErrorKind::InvalidState
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error ({kind:?}): {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportError {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

/// Outbound half of a device link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one framed message.
    async fn write(&self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Close the link.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// One item read from a device link.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOutput {
    /// An unframed `FromRadio` payload.
    Packet(Vec<u8>),
    /// Debug console text.
    Debug(String),
    /// Link state change reported by the transport.
    Status {
        status: DeviceStatus,
        reason: Option<String>,
    },
}

impl From<DecodedFrame> for DeviceOutput {
    fn from(frame: DecodedFrame) -> Self {
        match frame {
            DecodedFrame::Packet(bytes) => DeviceOutput::Packet(bytes),
            DecodedFrame::Debug(text) => DeviceOutput::Debug(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(TransportErrorKind::ConnectionReset.is_fatal());
        assert!(TransportErrorKind::InvalidState.is_fatal());
        assert!(!TransportErrorKind::Io.is_fatal());
        assert!(!TransportErrorKind::Busy.is_fatal());
    }

    #[test]
    fn test_output_from_frame() {
        assert_eq!(
            DeviceOutput::from(DecodedFrame::Packet(vec![1])),
            DeviceOutput::Packet(vec![1])
        );
        assert_eq!(
            DeviceOutput::from(DecodedFrame::Debug("x".into())),
            DeviceOutput::Debug("x".into())
        );
    }
}
