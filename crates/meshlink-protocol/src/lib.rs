//! Meshtastic-style client wire protocol
//!
//! This crate provides the types and utilities a host application needs to talk
//! to a packet-radio mesh device over a byte stream. The device speaks protobuf
//! envelopes carried inside a small length-prefixed frame.
//!
//! # Protocol Overview
//!
//! - **Frames**: `0x94 0xC3 len_hi len_lo payload`, see [`FrameCodec`]. Bytes
//!   outside a frame are the device's debug console and surface as text.
//! - **Outbound** (host → device): a [`ToRadio`] envelope, usually wrapping a
//!   [`MeshPacket`] whose decoded [`Data`] names an application [`PortNum`].
//! - **Inbound** (device → host): a [`FromRadio`] envelope carrying packets,
//!   node database entries, config, log records and handshake markers.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshlink_protocol::{FrameCodec, ToRadio, FromRadio};
//!
//! // Build a request and frame it
//! let frame = FrameCodec::encode(&ToRadio::want_config(42).encode_to_vec())?;
//!
//! // Parse whatever the device sent back
//! let mut codec = FrameCodec::new();
//! for item in codec.feed(&received) {
//!     // DecodedFrame::Packet(bytes) => FromRadio::decode_frame(&bytes)?
//! }
//! ```

mod admin;
mod commands;
mod constants;
mod error;
mod frame;
mod responses;
mod types;

pub use admin::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use responses::*;
pub use types::*;

pub use prost::Message;
