//! Protocol constants
//!
//! Framing bytes, size limits and well-known node numbers shared by every
//! transport that carries the device protocol.

// ============================================================================
// Framing
// ============================================================================

/// First byte of every frame header.
pub const FRAME_START1: u8 = 0x94;
/// Second byte of every frame header.
pub const FRAME_START2: u8 = 0xC3;
/// Header size: two marker bytes plus a big-endian u16 length.
pub const FRAME_HEADER_SIZE: usize = 4;
/// Largest payload the device accepts in a single frame.
pub const MAX_PAYLOAD_SIZE: usize = 512;

// ============================================================================
// Addressing
// ============================================================================

/// Destination node number meaning "every node".
pub const BROADCAST_NUM: u32 = 0xFFFF_FFFF;
/// Index of the primary channel.
pub const PRIMARY_CHANNEL: u32 = 0;

// ============================================================================
// Text message limits
// ============================================================================

/// Longest text payload that still fits a single packet once the envelope is added.
pub const MAX_TEXT_LENGTH: usize = 228;
