//! Outbound packet queue.
//!
//! Every packet written to the device passes through a [`PacketQueue`]. The
//! queue paces writes, keeps a single writer on the transport at a time and
//! settles each packet's [`PacketHandle`] when the device acknowledges it,
//! reports an error for it, or stays silent past the timeout.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use meshlink_metrics::{metric_defs, LinkLabels};
use meshlink_protocol::{FrameCodec, Message, ToRadio};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

struct QueuedPacket {
    id: u32,
    /// Encoded `ToRadio`, framed at write time.
    payload: Vec<u8>,
    sent: bool,
    enqueued_at: Instant,
    completion: Option<oneshot::Sender<Result<u32>>>,
    timer: Option<JoinHandle<()>>,
}

impl QueuedPacket {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct QueueState {
    packets: VecDeque<QueuedPacket>,
    /// Set while a drain owns the transport.
    locked: bool,
}

impl QueueState {
    fn take(&mut self, id: u32) -> Option<QueuedPacket> {
        let index = self.packets.iter().position(|p| p.id == id)?;
        self.packets.remove(index)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut QueuedPacket> {
        self.packets.iter_mut().find(|p| p.id == id)
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled whenever a drain releases the lock.
    unlocked: Notify,
    send_interval: Duration,
    timeout: Duration,
    labels: LinkLabels,
}

/// Caller side of a queued packet.
#[derive(Debug)]
pub struct PacketHandle {
    id: u32,
    rx: oneshot::Receiver<Result<u32>>,
}

impl PacketHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Wait for the packet to settle.
    ///
    /// Yields the id on acknowledgement, the settling error otherwise, and
    /// [`ClientError::Dropped`] if the queue discarded the packet unsettled.
    pub async fn wait(self) -> Result<u32> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Dropped { id: self.id }),
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Shared handle to an outbound queue. Clones refer to the same queue.
#[derive(Clone)]
pub struct PacketQueue {
    shared: Arc<Shared>,
}

impl PacketQueue {
    pub fn new(send_interval: Duration, timeout: Duration, labels: LinkLabels) -> Self {
        PacketQueue {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                unlocked: Notify::new(),
                send_interval,
                timeout,
                labels,
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.send_interval(),
            config.packet_timeout(),
            LinkLabels::new(config.link.as_str()),
        )
    }

    /// Queue an encoded `ToRadio` and start its timeout timer.
    ///
    /// Must be called from within a tokio runtime. An id that is already
    /// queued yields a handle that fails with
    /// [`ClientError::DuplicatePacketId`] without touching the queue.
    pub fn enqueue(&self, id: u32, payload: Vec<u8>) -> PacketHandle {
        let (tx, rx) = oneshot::channel();
        let mut state = self.shared.state.lock();

        if state.packets.iter().any(|p| p.id == id) {
            drop(state);
            warn!("PacketQueue: rejecting duplicate packet id {}", id);
            self.record_failure("duplicate");
            let _ = tx.send(Err(ClientError::DuplicatePacketId(id)));
            return PacketHandle { id, rx };
        }

        let timer = self.spawn_timer(id);
        state.packets.push_back(QueuedPacket {
            id,
            payload,
            sent: false,
            enqueued_at: Instant::now(),
            completion: Some(tx),
            timer: Some(timer),
        });
        let depth = state.packets.len();
        drop(state);

        trace!(id, depth, "packet enqueued");
        metrics::counter!(metric_defs::QUEUE_ENQUEUED.name, &self.labels()).increment(1);
        self.record_depth(depth);
        PacketHandle { id, rx }
    }

    fn spawn_timer(&self, id: u32) -> JoinHandle<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let timeout = self.shared.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                PacketQueue { shared }.expire(id);
            }
        })
    }

    /// Settle a packet whose timer fired.
    fn expire(&self, id: u32) {
        let Some(mut packet) = self.shared.state.lock().take(id) else {
            return;
        };
        // Called from the timer task itself, so detach instead of aborting.
        packet.timer = None;

        let exempt = ToRadio::decode(packet.payload.as_slice())
            .map(|message| message.expects_no_ack())
            .unwrap_or(false);
        if exempt {
            trace!(id, "unacknowledged packet kind timed out, treating as delivered");
            self.finish(packet, Ok(id));
        } else {
            warn!("PacketQueue: packet {} timed out", id);
            self.finish(packet, Err(ClientError::Timeout { id }));
        }
    }

    /// Write every unsent packet to `transport`, oldest first.
    ///
    /// Returns immediately when another drain is running. A fatal transport
    /// error ends the drain and is returned with the packet left unsent;
    /// transient errors are logged and the drain moves on.
    pub async fn process_queue(&self, transport: &dyn Transport) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.locked {
                trace!("PacketQueue: drain already running");
                return Ok(());
            }
            state.locked = true;
        }
        let mut guard = DrainGuard {
            shared: &self.shared,
            held: true,
        };

        let mut attempted = HashSet::new();
        loop {
            let next = {
                let mut state = self.shared.state.lock();
                let next = state
                    .packets
                    .iter()
                    .find(|p| !p.sent && !attempted.contains(&p.id))
                    .map(|p| p.id);
                // Unlock in the same critical section as the emptiness check, so a
                // packet enqueued after it finds the queue unlocked.
                if next.is_none() {
                    state.locked = false;
                    guard.held = false;
                }
                next
            };
            let Some(id) = next else {
                self.shared.unlocked.notify_waiters();
                return Ok(());
            };
            attempted.insert(id);

            tokio::time::sleep(self.shared.send_interval).await;

            // The packet may have been settled while we slept.
            let payload = {
                let mut state = self.shared.state.lock();
                match state.get_mut(id) {
                    Some(packet) if !packet.sent => packet.payload.clone(),
                    _ => continue,
                }
            };

            let frame = match FrameCodec::encode(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    self.process_error(id, e.into());
                    continue;
                }
            };

            match transport.write(frame).await {
                Ok(()) => {
                    if let Some(packet) = self.shared.state.lock().get_mut(id) {
                        packet.sent = true;
                    }
                    debug!(id, bytes = payload.len(), "packet written");
                    metrics::counter!(metric_defs::QUEUE_WRITTEN.name, &self.labels()).increment(1);
                }
                Err(e) if e.is_fatal() => {
                    warn!("PacketQueue: fatal write error for packet {}: {}", id, e);
                    self.record_write_error(true);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("PacketQueue: write error for packet {}, continuing: {}", id, e);
                    self.record_write_error(false);
                }
            }
        }
    }

    /// Settle a packet as delivered. Returns whether it was queued.
    pub fn process_ack(&self, id: u32) -> bool {
        let Some(mut packet) = self.shared.state.lock().take(id) else {
            return false;
        };
        packet.cancel_timer();
        debug!(id, "packet acknowledged");
        self.finish(packet, Ok(id));
        true
    }

    /// Settle a packet with `error`. Returns whether it was queued.
    pub fn process_error(&self, id: u32, error: ClientError) -> bool {
        let Some(mut packet) = self.shared.state.lock().take(id) else {
            return false;
        };
        packet.cancel_timer();
        debug!(id, %error, "packet failed");
        self.finish(packet, Err(error));
        true
    }

    /// Drop a packet without settling it.
    ///
    /// While a drain holds the queue this waits for it to finish first.
    pub async fn remove(&self, id: u32) -> bool {
        loop {
            let notified = self.shared.unlocked.notified();
            tokio::pin!(notified);
            // Register before checking the flag so an unlock in between is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if !state.locked {
                    let removed = state.take(id);
                    let depth = state.packets.len();
                    drop(state);
                    return match removed {
                        Some(mut packet) => {
                            packet.cancel_timer();
                            self.record_depth(depth);
                            true
                        }
                        None => false,
                    };
                }
            }
            notified.await;
        }
    }

    /// Drop every packet and cancel every timer. Handles see `Dropped`.
    pub fn clear(&self) {
        let packets: Vec<QueuedPacket> = self.shared.state.lock().packets.drain(..).collect();
        if packets.is_empty() {
            return;
        }
        debug!("PacketQueue: clearing {} packets", packets.len());
        for mut packet in packets {
            packet.cancel_timer();
            self.record_failure("dropped");
        }
        self.record_depth(0);
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().packets.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.shared.state.lock().packets.iter().any(|p| p.id == id)
    }

    /// Whether a drain currently owns the transport.
    pub fn is_locked(&self) -> bool {
        self.shared.state.lock().locked
    }

    /// `None` when the packet is not queued.
    pub fn is_sent(&self, id: u32) -> Option<bool> {
        self.shared
            .state
            .lock()
            .packets
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.sent)
    }

    fn finish(&self, mut packet: QueuedPacket, result: Result<u32>) {
        let latency_ms = packet.enqueued_at.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!(metric_defs::QUEUE_LATENCY.name, &self.labels()).record(latency_ms);
        match &result {
            Ok(_) => {
                metrics::counter!(metric_defs::QUEUE_ACKED.name, &self.labels()).increment(1)
            }
            Err(ClientError::Timeout { .. }) => self.record_failure("timeout"),
            Err(ClientError::Routing { .. }) => self.record_failure("routing"),
            Err(_) => self.record_failure("error"),
        }
        self.record_depth(self.len());

        if let Some(completion) = packet.completion.take() {
            // The caller may have stopped waiting.
            let _ = completion.send(result);
        }
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        self.shared.labels.to_labels()
    }

    fn record_failure(&self, reason: &'static str) {
        let labels = self.shared.labels.with(&[("reason", reason.to_string())]);
        metrics::counter!(metric_defs::QUEUE_FAILED.name, &labels).increment(1);
    }

    fn record_write_error(&self, fatal: bool) {
        let labels = self.shared.labels.with(&[("fatal", fatal.to_string())]);
        metrics::counter!(metric_defs::QUEUE_WRITE_ERRORS.name, &labels).increment(1);
    }

    fn record_depth(&self, depth: usize) {
        metrics::gauge!(metric_defs::QUEUE_DEPTH.name, &self.labels()).set(depth as f64);
    }
}

/// Releases the drain lock if the drain ends early (error or cancellation).
struct DrainGuard<'a> {
    shared: &'a Shared,
    held: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            self.shared.state.lock().locked = false;
            self.shared.unlocked.notify_waiters();
        }
    }
}
