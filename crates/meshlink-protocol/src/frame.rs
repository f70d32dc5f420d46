//! Frame encoding/decoding utilities.
//!
//! Every protobuf message on a stream transport travels inside a frame with a
//! two byte magic header and a big-endian payload length:
//!
//! ```text
//! +------+------+--------+--------+-------------------+
//! | 0x94 | 0xC3 | len_hi | len_lo | payload[0..len]   |
//! +------+------+--------+--------+-------------------+
//! ```
//!
//! Anything the device prints outside a frame (boot banners, debug console
//! output) is passed through as text so it can be logged.

use bytes::{Buf, BufMut, BytesMut};
use log::{trace, warn};

use crate::constants::*;
use crate::error::ProtocolError;

/// One unit of decoded stream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// The payload of a complete frame.
    Packet(Vec<u8>),
    /// Out-of-band bytes, decoded as text on a best-effort basis.
    Debug(String),
}

/// A codec for reading and writing framed messages.
///
/// Decoding is incremental: bytes may arrive in arbitrarily small chunks and
/// the codec picks up where it stalled on the next [`push`](Self::push).
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(FRAME_HEADER_SIZE + MAX_PAYLOAD_SIZE),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Add received data and drain everything that can be decoded from it.
    pub fn feed(&mut self, data: &[u8]) -> Vec<DecodedFrame> {
        self.push(data);
        let mut out = Vec::new();
        while let Some(item) = self.decode() {
            out.push(item);
        }
        out
    }

    /// Try to decode the next item from the buffer.
    ///
    /// Returns `None` once the buffer is empty or the next frame is incomplete.
    pub fn decode(&mut self) -> Option<DecodedFrame> {
        loop {
            if self.buffer.is_empty() {
                return None;
            }

            let Some(start) = self.buffer.iter().position(|&b| b == FRAME_START1) else {
                let text = self.buffer.split();
                return Some(debug_text(&text));
            };

            // A lone marker at the end may be the start of a header still in flight.
            if start + 1 >= self.buffer.len() {
                if start == 0 {
                    return None;
                }
                let text = self.buffer.split_to(start);
                return Some(debug_text(&text));
            }

            if self.buffer[start + 1] != FRAME_START2 {
                // Keep a second 0x94 in the buffer, it may open the real header.
                let end = if self.buffer[start + 1] == FRAME_START1 {
                    start + 1
                } else {
                    start + 2
                };
                let text = self.buffer.split_to(end);
                return Some(debug_text(&text));
            }

            if start > 0 {
                let text = self.buffer.split_to(start);
                return Some(debug_text(&text));
            }

            if self.buffer.len() < FRAME_HEADER_SIZE {
                return None;
            }

            let len = u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize;
            if len > MAX_PAYLOAD_SIZE {
                warn!("frame header declares {} bytes, resynchronizing", len);
                self.buffer.advance(2);
                continue;
            }

            if self.buffer.len() < FRAME_HEADER_SIZE + len {
                return None;
            }

            let payload = &self.buffer[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
            if let Some(offset) = find_marker(payload) {
                warn!(
                    "malformed frame, discarding {} bytes up to embedded header",
                    FRAME_HEADER_SIZE + offset
                );
                self.buffer.advance(FRAME_HEADER_SIZE + offset);
                continue;
            }

            self.buffer.advance(FRAME_HEADER_SIZE);
            let packet = self.buffer.split_to(len).to_vec();
            trace!("decoded frame of {} bytes", packet.len());
            return Some(DecodedFrame::Packet(packet));
        }
    }

    /// Encode a payload with the frame header.
    ///
    /// Fails with [`ProtocolError::PayloadTooLarge`] above [`MAX_PAYLOAD_SIZE`].
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_u8(FRAME_START1);
        buf.put_u8(FRAME_START2);
        buf.put_u16(payload.len() as u16);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(2)
        .position(|pair| pair[0] == FRAME_START1 && pair[1] == FRAME_START2)
}

fn debug_text(bytes: &[u8]) -> DecodedFrame {
    DecodedFrame::Debug(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packets(items: &[DecodedFrame]) -> Vec<Vec<u8>> {
        items
            .iter()
            .filter_map(|item| match item {
                DecodedFrame::Packet(p) => Some(p.clone()),
                DecodedFrame::Debug(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_encode_layout() {
        let encoded = FrameCodec::encode(b"abc").expect("small payload encodes");
        assert_eq!(encoded, vec![0x94, 0xC3, 0x00, 0x03, b'a', b'b', b'c']);

        let big = vec![0u8; 300];
        let encoded = FrameCodec::encode(&big).unwrap();
        assert_eq!(&encoded[..4], &[0x94, 0xC3, 0x01, 0x2C]);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            FrameCodec::encode(&payload),
            Err(ProtocolError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: MAX_PAYLOAD_SIZE + 1,
            })
        );
    }

    #[test]
    fn test_round_trip_boundaries() {
        for len in [0usize, 1, MAX_PAYLOAD_SIZE] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 0x90) as u8).collect();
            let mut codec = FrameCodec::new();
            let out = codec.feed(&FrameCodec::encode(&payload).unwrap());
            assert_eq!(out, vec![DecodedFrame::Packet(payload)], "len {}", len);
            assert_eq!(codec.buffered_len(), 0);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let payload = b"fragmented payload".to_vec();
        let encoded = FrameCodec::encode(&payload).unwrap();

        let mut codec = FrameCodec::new();
        let mut out = Vec::new();
        for byte in &encoded {
            out.extend(codec.feed(&[*byte]));
        }
        assert_eq!(out, vec![DecodedFrame::Packet(payload)]);
    }

    #[test]
    fn test_arbitrary_split_points() {
        let payload: Vec<u8> = (0u8..64).collect();
        let encoded = FrameCodec::encode(&payload).unwrap();

        for split in 1..encoded.len() {
            let mut codec = FrameCodec::new();
            let mut out = codec.feed(&encoded[..split]);
            out.extend(codec.feed(&encoded[split..]));
            assert_eq!(packets(&out), vec![payload.clone()], "split at {}", split);
        }
    }

    #[test]
    fn test_resync_after_broken_header() {
        let mut stream = b"boot".to_vec();
        stream.extend_from_slice(&[0x94, 0x00, 0x04, 0x94, 0xC3, 0x00, 0x01, 0xAA]);

        let mut codec = FrameCodec::new();
        let out = codec.feed(&stream);

        assert_eq!(packets(&out), vec![vec![0xAA]]);
        let debug: Vec<&String> = out
            .iter()
            .filter_map(|item| match item {
                DecodedFrame::Debug(text) => Some(text),
                DecodedFrame::Packet(_) => None,
            })
            .collect();
        assert_eq!(debug.len(), 2);
        assert!(debug[0].starts_with("boot"));
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_embedded_header_discards_truncated_frame() {
        // First header claims 6 bytes, but a fresh frame starts inside them.
        let mut stream = vec![0x94, 0xC3, 0x00, 0x06, 0x01, 0x02];
        stream.extend_from_slice(&FrameCodec::encode(&[0x10, 0x20]).unwrap());

        let mut codec = FrameCodec::new();
        let out = codec.feed(&stream);
        assert_eq!(out, vec![DecodedFrame::Packet(vec![0x10, 0x20])]);
    }

    #[test]
    fn test_plain_text_passes_through() {
        let mut codec = FrameCodec::new();
        let out = codec.feed(b"INFO | ??:??:?? 3 [Main] booting\r\n");
        assert_eq!(
            out,
            vec![DecodedFrame::Debug(
                "INFO | ??:??:?? 3 [Main] booting\r\n".to_string()
            )]
        );
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_trailing_marker_is_kept() {
        let mut codec = FrameCodec::new();
        let out = codec.feed(&[b'o', b'k', 0x94]);
        assert_eq!(out, vec![DecodedFrame::Debug("ok".to_string())]);
        assert_eq!(codec.buffered_len(), 1);

        let out = codec.feed(&[0xC3, 0x00, 0x01, 0x55]);
        assert_eq!(out, vec![DecodedFrame::Packet(vec![0x55])]);
    }

    #[test]
    fn test_double_marker_keeps_real_header() {
        let mut stream = vec![0x94];
        stream.extend_from_slice(&FrameCodec::encode(&[0x42]).unwrap());

        let mut codec = FrameCodec::new();
        let out = codec.feed(&stream);
        assert_eq!(packets(&out), vec![vec![0x42]]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut stream = FrameCodec::encode(b"one").unwrap();
        stream.extend_from_slice(&FrameCodec::encode(b"two").unwrap());

        let mut codec = FrameCodec::new();
        assert_eq!(packets(&codec.feed(&stream)), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_implausible_length_resyncs() {
        let mut stream = vec![0x94, 0xC3, 0xFF, 0xFF];
        stream.extend_from_slice(&FrameCodec::encode(&[0x07]).unwrap());

        let mut codec = FrameCodec::new();
        assert_eq!(packets(&codec.feed(&stream)), vec![vec![0x07]]);
    }

    #[test]
    fn test_incomplete_frame_waits() {
        let encoded = FrameCodec::encode(&[1, 2, 3, 4]).unwrap();
        let mut codec = FrameCodec::new();
        assert!(codec.feed(&encoded[..5]).is_empty());
        assert_eq!(codec.buffered_len(), 5);

        codec.clear();
        assert_eq!(codec.buffered_len(), 0);
    }
}
