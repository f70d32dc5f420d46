//! XModem file transfer over the device link.
//!
//! Transfers reuse the classic XModem control characters, but each packet
//! rides inside a `ToRadio`/`FromRadio` envelope rather than on the raw wire.
//! Sequence 0 carries the filename; the control code used for it tells the
//! device whether the host wants to upload (`SOH`) or download (`STX`).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use crc::{Crc, CRC_16_IBM_3740};
use meshlink_metrics::metric_defs;
use meshlink_protocol::x_modem::Control;
use meshlink_protocol::XModem;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// Payload bytes per data packet.
pub const CHUNK_SIZE: usize = 128;

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection.
const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub fn crc16(data: &[u8]) -> u16 {
    CCITT.checksum(data)
}

/// Sends XModem packets to the device.
#[async_trait]
pub trait XmodemLink: Send + Sync {
    async fn send_xmodem(&self, packet: XModem) -> Result<()>;
}

/// Snapshot of a transfer in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmodemState {
    pub sequence_counter: u32,
    pub rx_chunks: BTreeMap<u32, Vec<u8>>,
    pub tx_chunks: Vec<Vec<u8>>,
}

impl XmodemState {
    fn data_packet(&self, seq: u32) -> Option<XModem> {
        let index = usize::try_from(seq).ok()?.checked_sub(1)?;
        let chunk = self.tx_chunks.get(index)?;
        Some(XModem::new(Control::Soh, seq, crc16(chunk) as u32, chunk.clone()))
    }
}

pub struct XmodemTransfer {
    state: Mutex<XmodemState>,
    delay: Duration,
}

impl XmodemTransfer {
    /// `delay` is waited before answering each inbound packet.
    pub fn new(delay: Duration) -> Self {
        XmodemTransfer {
            state: Mutex::new(XmodemState::default()),
            delay,
        }
    }

    /// Ask the device to send `filename`.
    pub async fn download_file(&self, link: &dyn XmodemLink, filename: &str) -> Result<()> {
        debug!("XModem: requesting download of {}", filename);
        link.send_xmodem(XModem::new(Control::Stx, 0, 0, filename.as_bytes().to_vec()))
            .await
    }

    /// Offer `data` to the device as `filename`; chunks follow as it acknowledges.
    pub async fn upload_file(&self, link: &dyn XmodemLink, filename: &str, data: &[u8]) -> Result<()> {
        {
            let mut state = self.state.lock();
            *state = XmodemState::default();
            state.tx_chunks = data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
            debug!(
                "XModem: uploading {} ({} bytes, {} chunks)",
                filename,
                data.len(),
                state.tx_chunks.len()
            );
        }
        link.send_xmodem(XModem::new(Control::Soh, 0, 0, filename.as_bytes().to_vec()))
            .await
    }

    /// React to a packet from the device.
    pub async fn handle_packet(&self, link: &dyn XmodemLink, packet: XModem) -> Result<()> {
        tokio::time::sleep(self.delay).await;

        let Some(reply) = self.next_reply(packet) else {
            return Ok(());
        };
        link.send_xmodem(reply).await
    }

    /// Apply `packet` to the state and compute the answer, if any.
    fn next_reply(&self, packet: XModem) -> Option<XModem> {
        let control = match packet.control_code() {
            Some(control) => control,
            None => {
                warn!("XModem: ignoring unknown control code {}", packet.control);
                return None;
            }
        };

        let mut state = self.state.lock();
        match control {
            Control::Soh => {
                state.sequence_counter = packet.seq;
                if crc16(&packet.buffer) as u32 == packet.crc16 {
                    metrics::counter!(metric_defs::XMODEM_CHUNKS_RECEIVED.name).increment(1);
                    state.rx_chunks.insert(packet.seq, packet.buffer);
                    Some(XModem::new(Control::Ack, packet.seq, 0, Vec::new()))
                } else {
                    warn!("XModem: CRC mismatch on chunk {}", packet.seq);
                    metrics::counter!(metric_defs::XMODEM_CRC_FAILURES.name).increment(1);
                    Some(XModem::new(Control::Nak, packet.seq, 0, Vec::new()))
                }
            }
            Control::Ack => {
                let Some(counter) = state.sequence_counter.checked_add(1) else {
                    warn!("XModem: sequence counter exhausted, abandoning transfer");
                    *state = XmodemState::default();
                    return None;
                };
                state.sequence_counter = counter;
                if let Some(chunk) = state.data_packet(counter) {
                    metrics::counter!(metric_defs::XMODEM_CHUNKS_SENT.name).increment(1);
                    Some(chunk)
                } else if counter as usize == state.tx_chunks.len() + 1 {
                    debug!("XModem: all {} chunks acknowledged", state.tx_chunks.len());
                    Some(XModem::new(Control::Eot, 0, 0, Vec::new()))
                } else {
                    *state = XmodemState::default();
                    None
                }
            }
            Control::Nak => {
                let counter = state.sequence_counter;
                match state.data_packet(counter) {
                    Some(chunk) => {
                        debug!("XModem: resending chunk {}", counter);
                        metrics::counter!(metric_defs::XMODEM_CHUNKS_SENT.name).increment(1);
                        Some(chunk)
                    }
                    None => {
                        warn!("XModem: NAK with no chunk to resend at sequence {}", counter);
                        None
                    }
                }
            }
            Control::Can => {
                debug!("XModem: transfer cancelled by device");
                *state = XmodemState::default();
                None
            }
            Control::Eot | Control::Nul | Control::Stx | Control::Ctrlz => None,
        }
    }

    /// Abandon any transfer in progress.
    pub fn clear(&self) {
        *self.state.lock() = XmodemState::default();
    }

    pub fn state(&self) -> XmodemState {
        self.state.lock().clone()
    }

    /// Received chunks joined in sequence order.
    pub fn received_data(&self) -> Vec<u8> {
        self.state.lock().rx_chunks.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<XModem>>,
    }

    #[async_trait]
    impl XmodemLink for Capture {
        async fn send_xmodem(&self, packet: XModem) -> Result<()> {
            self.sent.lock().push(packet);
            Ok(())
        }
    }

    fn control(control: Control, seq: u32) -> XModem {
        XModem::new(control, seq, 0, Vec::new())
    }

    fn transfer() -> XmodemTransfer {
        XmodemTransfer::new(Duration::from_millis(100))
    }

    #[test]
    fn test_crc_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_good_chunk_is_acked_and_stored() {
        let xmodem = transfer();
        let link = Capture::default();
        let chunk = b"hello".to_vec();
        let packet = XModem::new(Control::Soh, 1, crc16(&chunk) as u32, chunk.clone());

        xmodem.handle_packet(&link, packet).await.unwrap();

        assert_eq!(link.sent.lock().as_slice(), &[control(Control::Ack, 1)]);
        assert_eq!(xmodem.received_data(), chunk);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_crc_is_naked_and_dropped() {
        let xmodem = transfer();
        let link = Capture::default();
        let chunk = b"hello".to_vec();
        let packet = XModem::new(Control::Soh, 2, (crc16(&chunk) ^ 1) as u32, chunk);

        xmodem.handle_packet(&link, packet).await.unwrap();

        assert_eq!(link.sent.lock().as_slice(), &[control(Control::Nak, 2)]);
        assert!(xmodem.state().rx_chunks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_walk() {
        let xmodem = transfer();
        let link = Capture::default();
        let data: Vec<u8> = (0..200u32).map(|i| i as u8).collect();

        xmodem.upload_file(&link, "notes.txt", &data).await.unwrap();
        assert_eq!(xmodem.state().tx_chunks.len(), 2);

        xmodem.handle_packet(&link, control(Control::Ack, 0)).await.unwrap();
        xmodem.handle_packet(&link, control(Control::Ack, 1)).await.unwrap();
        xmodem.handle_packet(&link, control(Control::Ack, 2)).await.unwrap();

        let sent = link.sent.lock().clone();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].control_code(), Some(Control::Soh));
        assert_eq!((sent[0].seq, sent[0].buffer.as_slice()), (0, &b"notes.txt"[..]));
        assert_eq!((sent[1].seq, sent[1].buffer.as_slice()), (1, &data[..128]));
        assert_eq!(sent[1].crc16, crc16(&data[..128]) as u32);
        assert_eq!((sent[2].seq, sent[2].buffer.as_slice()), (2, &data[128..]));
        assert_eq!(sent[3].control_code(), Some(Control::Eot));

        // The device acknowledges EOT; the transfer is then over.
        xmodem.handle_packet(&link, control(Control::Ack, 3)).await.unwrap();
        assert_eq!(link.sent.lock().len(), 4);
        assert_eq!(xmodem.state(), XmodemState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_resends_current_chunk() {
        let xmodem = transfer();
        let link = Capture::default();
        xmodem.upload_file(&link, "f", b"abc").await.unwrap();
        xmodem.handle_packet(&link, control(Control::Ack, 0)).await.unwrap();
        xmodem.handle_packet(&link, control(Control::Nak, 1)).await.unwrap();

        let sent = link.sent.lock().clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], sent[2]);
        assert_eq!(xmodem.state().sequence_counter, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_before_any_chunk_sends_nothing() {
        let xmodem = transfer();
        let link = Capture::default();
        xmodem.handle_packet(&link, control(Control::Nak, 0)).await.unwrap();
        assert!(link.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_state() {
        let xmodem = transfer();
        let link = Capture::default();
        xmodem.upload_file(&link, "f", b"abc").await.unwrap();
        xmodem.handle_packet(&link, control(Control::Can, 0)).await.unwrap();
        assert_eq!(xmodem.state(), XmodemState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_controls_change_nothing() {
        let xmodem = transfer();
        let link = Capture::default();
        xmodem.upload_file(&link, "f", b"abc").await.unwrap();
        let before = xmodem.state();
        for code in [Control::Eot, Control::Nul, Control::Ctrlz, Control::Stx] {
            xmodem.handle_packet(&link, control(code, 5)).await.unwrap();
        }
        assert_eq!(xmodem.state(), before);
        assert_eq!(link.sent.lock().len(), 1);
    }

    #[test]
    fn test_ack_after_last_sequence_resets() {
        let xmodem = transfer();
        let chunk = b"tail".to_vec();
        let packet = XModem::new(Control::Soh, u32::MAX, crc16(&chunk) as u32, chunk);
        assert!(xmodem.next_reply(packet).is_some());
        assert_eq!(xmodem.state().sequence_counter, u32::MAX);

        assert!(xmodem.next_reply(control(Control::Ack, 0)).is_none());
        assert_eq!(xmodem.state(), XmodemState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_wait_for_delay() {
        let xmodem = transfer();
        let link = Capture::default();
        let start = tokio::time::Instant::now();
        xmodem.handle_packet(&link, control(Control::Can, 0)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_request() {
        let xmodem = transfer();
        let link = Capture::default();
        xmodem.download_file(&link, "/prefs/config.proto").await.unwrap();
        let sent = link.sent.lock().clone();
        assert_eq!(sent[0].control_code(), Some(Control::Stx));
        assert_eq!(sent[0].seq, 0);
        assert_eq!(sent[0].buffer, b"/prefs/config.proto".to_vec());
    }

    #[test]
    fn test_received_data_in_sequence_order() {
        let xmodem = transfer();
        for (seq, bytes) in [(2u32, b"world".to_vec()), (1, b"hello ".to_vec())] {
            let packet = XModem::new(Control::Soh, seq, crc16(&bytes) as u32, bytes);
            assert!(xmodem.next_reply(packet).is_some());
        }
        assert_eq!(xmodem.received_data(), b"hello world".to_vec());
    }
}
