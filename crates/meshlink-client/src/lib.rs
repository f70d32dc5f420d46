//! Host-side protocol engine for Meshtastic-style radio devices.
//!
//! Built on the wire types of [`meshlink_protocol`], this crate runs the parts
//! of the protocol that need state and time:
//!
//! - [`PacketQueue`]: paced, single-writer delivery of outbound packets, each
//!   settled by an acknowledgement, a routing error or a timeout.
//! - [`DeviceSession`]: connection status, the `want_config_id` handshake,
//!   heartbeats and dispatch of inbound envelopes to [`DeviceEvent`]s.
//! - [`XmodemTransfer`]: file upload and download over the same link.
//!
//! Transports are supplied by the caller through [`Transport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshlink_client::{ClientConfig, DeviceSession, DeviceStatus, EventBus};
//!
//! let config = ClientConfig::load("meshlink.yaml")?;
//! let bus = EventBus::from_config(&config);
//! let mut events = bus.subscribe();
//! let session = DeviceSession::new(config, transport, Arc::new(bus))?;
//!
//! session.update_device_status(DeviceStatus::Connected);
//! tokio::spawn({
//!     let session = session.clone();
//!     async move { session.configure().await }
//! });
//!
//! // In the read loop:
//! session.feed(&bytes_from_device)?;
//! ```

mod config;
mod error;
mod events;
mod ids;
mod queue;
mod session;
mod transport;
mod xmodem;

pub use config::{ClientConfig, FirmwareVersion, LinkKind, SERIAL_HEARTBEAT_INTERVAL, SERIAL_IDLE_DISCONNECT};
pub use error::{ClientError, Result};
pub use events::{DestinationKind, DeviceEvent, DeviceStatus, EventBus, EventSink, PacketMetadata};
pub use ids::{generate_random_id, random_id_from};
pub use queue::{PacketHandle, PacketQueue};
pub use session::{Destination, DeviceSession, PacketOptions, SessionConfig};
pub use transport::{DeviceOutput, Transport, TransportError, TransportErrorKind};
pub use xmodem::{crc16, XmodemLink, XmodemState, XmodemTransfer, CHUNK_SIZE};

pub use meshlink_protocol as protocol;
