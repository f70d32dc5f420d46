//! Device session.
//!
//! A [`DeviceSession`] owns everything the host knows about one connected
//! device: its connection status, the config handshake, the outbound queue
//! and any file transfer in progress. Inbound traffic enters through
//! [`DeviceSession::feed`] or [`DeviceSession::handle_output`] and is
//! published as [`DeviceEvent`]s.

mod admin;
mod dispatch;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshlink_metrics::{metric_defs, LinkLabels};
use meshlink_protocol::{
    mesh_packet, Data, FrameCodec, Message, MeshPacket, MyNodeInfo, PortNum, ProtocolError,
    ToRadio, XModem, BROADCAST_NUM, MAX_PAYLOAD_SIZE, PRIMARY_CHANNEL,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, FirmwareVersion};
use crate::error::{ClientError, Result};
use crate::events::{DeviceEvent, DeviceStatus, EventSink};
use crate::ids::generate_random_id;
use crate::queue::PacketQueue;
use crate::transport::Transport;
use crate::xmodem::{XmodemLink, XmodemTransfer};

// ============================================================================
// Types
// ============================================================================

/// Handshake and edit-session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Correlates `want_config_id` with `config_complete_id`.
    pub config_id: u32,
    pub is_configured: bool,
    /// An admin edit session is open on the device.
    pub pending_settings_changes: bool,
}

/// Where a packet is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    #[default]
    Broadcast,
    /// The node this session is connected to.
    Local,
    Node(u32),
}

/// Per-packet send options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketOptions {
    pub destination: Destination,
    pub channel: u32,
    pub want_ack: bool,
    pub want_response: bool,
    /// Dispatch the packet locally as if it had been received.
    pub echo: bool,
    pub reply_id: Option<u32>,
    pub emoji: Option<u32>,
}

impl Default for PacketOptions {
    fn default() -> Self {
        PacketOptions {
            destination: Destination::Broadcast,
            channel: PRIMARY_CHANNEL,
            want_ack: true,
            want_response: false,
            echo: false,
            reply_id: None,
            emoji: None,
        }
    }
}

impl PacketOptions {
    pub fn to(destination: Destination) -> Self {
        PacketOptions {
            destination,
            ..Default::default()
        }
    }
}

struct SessionState {
    status: DeviceStatus,
    session: SessionConfig,
    /// Queue id of the outstanding `want_config_id` request.
    handshake_packet: Option<u32>,
    my_node_info: Option<MyNodeInfo>,
    heartbeat_interval: Option<Duration>,
    heartbeat: Option<JoinHandle<()>>,
}

struct SessionInner {
    config: ClientConfig,
    min_firmware: FirmwareVersion,
    labels: LinkLabels,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    queue: PacketQueue,
    xmodem: XmodemTransfer,
    decoder: Mutex<FrameCodec>,
    state: Mutex<SessionState>,
}

/// Cheaply cloneable handle to one device session.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

// ============================================================================
// Construction and state
// ============================================================================

impl DeviceSession {
    /// Create a session over `transport`, publishing into `events`.
    ///
    /// Draws a random config id unless `config.config_id` is set.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let config_id = match config.config_id {
            Some(id) => id,
            None => generate_random_id()?,
        };
        let min_firmware = config.min_firmware()?;
        let heartbeat_interval = config.heartbeat_interval();

        Ok(DeviceSession {
            inner: Arc::new(SessionInner {
                min_firmware,
                labels: LinkLabels::new(config.link.as_str()),
                queue: PacketQueue::from_config(&config),
                xmodem: XmodemTransfer::new(config.xmodem_delay()),
                decoder: Mutex::new(FrameCodec::new()),
                state: Mutex::new(SessionState {
                    status: DeviceStatus::Disconnected,
                    session: SessionConfig {
                        config_id,
                        is_configured: false,
                        pending_settings_changes: false,
                    },
                    handshake_packet: None,
                    my_node_info: None,
                    heartbeat_interval,
                    heartbeat: None,
                }),
                config,
                transport,
                events,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn status(&self) -> DeviceStatus {
        self.inner.state.lock().status
    }

    pub fn session_config(&self) -> SessionConfig {
        self.inner.state.lock().session
    }

    pub fn config_id(&self) -> u32 {
        self.inner.state.lock().session.config_id
    }

    pub fn queue(&self) -> &PacketQueue {
        &self.inner.queue
    }

    pub fn xmodem(&self) -> &XmodemTransfer {
        &self.inner.xmodem
    }

    pub fn my_node_info(&self) -> Option<MyNodeInfo> {
        self.inner.state.lock().my_node_info.clone()
    }

    /// Our node number, or 0 before `my_info` has arrived.
    pub fn my_node_num(&self) -> u32 {
        self.inner
            .state
            .lock()
            .my_node_info
            .as_ref()
            .map_or(0, |info| info.my_node_num)
    }

    fn publish(&self, event: DeviceEvent) {
        self.inner.events.publish(event);
    }

    /// Spawn onto the current runtime, if there is one.
    fn spawn_task<F>(&self, what: &str, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(future)),
            Err(_) => {
                warn!("DeviceSession: no async runtime, cannot start {}", what);
                None
            }
        }
    }

    /// Move to `status`. Repeating the current status does nothing.
    pub fn update_device_status(&self, status: DeviceStatus) {
        {
            let mut state = self.inner.state.lock();
            if state.status == status {
                return;
            }
            debug!("DeviceSession: status {:?} -> {:?}", state.status, status);
            state.status = status;
            if status == DeviceStatus::Disconnected {
                state.session.is_configured = false;
                state.handshake_packet = None;
            }
        }

        let labels = self.inner.labels.with(&[("status", status.as_str().to_string())]);
        metrics::counter!(metric_defs::SESSION_STATUS_CHANGES.name, &labels).increment(1);
        self.publish(DeviceEvent::StatusChanged(status));

        match status {
            DeviceStatus::Connected => self.start_heartbeat(),
            DeviceStatus::Disconnected => {
                self.stop_heartbeat();
                self.inner.queue.clear();
            }
            _ => {}
        }
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Request the device's configuration.
    ///
    /// Resolves once the matching `config_complete_id` arrives. Fails with
    /// [`ClientError::ConnectionLost`] if the session disconnects first.
    pub async fn configure(&self) -> Result<u32> {
        self.update_device_status(DeviceStatus::Configuring);
        let config_id = self.config_id();
        let id = generate_random_id()?;
        self.inner.state.lock().handshake_packet = Some(id);
        info!("DeviceSession: requesting configuration with id {}", config_id);

        match self.send_raw(ToRadio::want_config(config_id).encode_to_vec(), id).await {
            Ok(id) => Ok(id),
            Err(e) if self.status() == DeviceStatus::Disconnected => {
                debug!("DeviceSession: configure failed after disconnect: {}", e);
                Err(ClientError::ConnectionLost)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// Replace the heartbeat timer. `None` stops it.
    ///
    /// On serial links the interval must be shorter than the device's idle
    /// disconnect, otherwise [`ClientError::Config`] is returned and the
    /// running timer is left alone.
    pub fn set_heartbeat_interval(&self, interval: Option<Duration>) -> Result<()> {
        if let Some(interval) = interval {
            self.inner.config.check_heartbeat_interval(interval)?;
        }
        let running = {
            let mut state = self.inner.state.lock();
            state.heartbeat_interval = interval;
            state.status != DeviceStatus::Disconnected
        };
        self.stop_heartbeat();
        if running {
            self.start_heartbeat();
        }
        Ok(())
    }

    fn start_heartbeat(&self) {
        let Some(interval) = self.inner.state.lock().heartbeat_interval else {
            return;
        };
        self.stop_heartbeat();

        let weak = Arc::downgrade(&self.inner);
        let task = self.spawn_task("heartbeat", async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let session = DeviceSession { inner };
                if let Err(e) = session.send_heartbeat().await {
                    warn!("DeviceSession: heartbeat failed: {}", e);
                }
            }
        });
        debug!("DeviceSession: heartbeat every {:?}", interval);
        self.inner.state.lock().heartbeat = task;
    }

    fn stop_heartbeat(&self) {
        if let Some(task) = self.inner.state.lock().heartbeat.take() {
            task.abort();
        }
    }

    /// Queue a keep-alive and drain, without waiting for it to settle.
    async fn send_heartbeat(&self) -> Result<()> {
        let id = generate_random_id()?;
        let _handle = self
            .inner
            .queue
            .enqueue(id, ToRadio::heartbeat().encode_to_vec());
        self.inner
            .queue
            .process_queue(self.inner.transport.as_ref())
            .await
    }

    /// Send a keep-alive and wait for it to settle.
    ///
    /// The device never acknowledges heartbeats, so this resolves when the
    /// packet timeout elapses.
    pub async fn heartbeat(&self) -> Result<u32> {
        let id = generate_random_id()?;
        self.send_raw(ToRadio::heartbeat().encode_to_vec(), id).await
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queue an encoded `ToRadio`, drain the queue and wait for the packet.
    pub async fn send_raw(&self, payload: Vec<u8>, id: u32) -> Result<u32> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            }
            .into());
        }
        let handle = self.inner.queue.enqueue(id, payload);
        self.inner
            .queue
            .process_queue(self.inner.transport.as_ref())
            .await?;
        handle.wait().await
    }

    /// Send an application payload on `port`.
    ///
    /// Returns the packet id once the device acknowledges it.
    pub async fn send_packet(
        &self,
        payload: Vec<u8>,
        port: PortNum,
        options: PacketOptions,
    ) -> Result<u32> {
        let id = generate_random_id()?;
        let my_node = self.my_node_num();
        let to = match options.destination {
            Destination::Broadcast => BROADCAST_NUM,
            Destination::Local => my_node,
            Destination::Node(num) => num,
        };

        let packet = MeshPacket {
            from: my_node,
            to,
            id,
            channel: options.channel,
            want_ack: options.want_ack,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                portnum: port as i32,
                payload,
                want_response: options.want_response,
                reply_id: options.reply_id.unwrap_or(0),
                emoji: options.emoji.unwrap_or(0),
                ..Default::default()
            })),
            ..Default::default()
        };

        if options.echo {
            let mut echoed = packet.clone();
            echoed.rx_time = chrono::Utc::now().timestamp().try_into().unwrap_or(0);
            if let Err(e) = self.handle_mesh_packet(echoed) {
                warn!("DeviceSession: failed to echo packet {}: {}", id, e);
            }
        }

        self.send_raw(ToRadio::packet(packet).encode_to_vec(), id)
            .await
    }

    // ========================================================================
    // File transfer
    // ========================================================================

    pub async fn download_file(&self, filename: &str) -> Result<()> {
        self.inner.xmodem.download_file(self, filename).await
    }

    pub async fn upload_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        self.inner.xmodem.upload_file(self, filename, data).await
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Drop the session state and close the transport.
    pub async fn disconnect(&self) -> Result<()> {
        self.update_device_status(DeviceStatus::Disconnected);
        self.inner.xmodem.clear();
        self.inner.decoder.lock().clear();
        self.inner.transport.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl XmodemLink for DeviceSession {
    async fn send_xmodem(&self, packet: XModem) -> Result<()> {
        let id = generate_random_id()?;
        // Nothing acknowledges XModem envelopes; their timer settles them as delivered.
        let _handle = self
            .inner
            .queue
            .enqueue(id, ToRadio::xmodem(packet).encode_to_vec());
        self.inner
            .queue
            .process_queue(self.inner.transport.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkKind;
    use crate::transport::TransportError;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn write(&self, _data: Vec<u8>) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&self) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    fn session(config: ClientConfig) -> (DeviceSession, Arc<Mutex<Vec<DeviceEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            move |event: DeviceEvent| events.lock().push(event)
        };
        let session = DeviceSession::new(config, Arc::new(NullTransport), Arc::new(sink)).unwrap();
        (session, events)
    }

    #[test]
    fn test_supplied_config_id_is_kept() {
        let (session, _) = session(ClientConfig {
            config_id: Some(1234),
            ..Default::default()
        });
        assert_eq!(session.config_id(), 1234);
        assert_eq!(session.status(), DeviceStatus::Disconnected);
        assert!(!session.session_config().is_configured);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ClientConfig {
            event_capacity: 0,
            ..Default::default()
        };
        let result = DeviceSession::new(
            config,
            Arc::new(NullTransport),
            Arc::new(|_event: DeviceEvent| {}),
        );
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_status_publishes_once() {
        let (session, events) = session(ClientConfig {
            heartbeat_interval_ms: Some(0),
            ..Default::default()
        });
        session.update_device_status(DeviceStatus::Connecting);
        session.update_device_status(DeviceStatus::Connecting);
        assert_eq!(
            *events.lock(),
            vec![DeviceEvent::StatusChanged(DeviceStatus::Connecting)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_runs_only_while_connected() {
        let (session, _) = session(ClientConfig {
            heartbeat_interval_ms: Some(1_000),
            ..Default::default()
        });
        session.update_device_status(DeviceStatus::Connected);
        assert!(session.inner.state.lock().heartbeat.is_some());

        session.update_device_status(DeviceStatus::Disconnected);
        assert!(session.inner.state.lock().heartbeat.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_serial_heartbeat_setter_enforces_idle_window() {
        let (session, _) = session(ClientConfig {
            link: LinkKind::Serial,
            heartbeat_interval_ms: Some(1_000),
            ..Default::default()
        });
        session.update_device_status(DeviceStatus::Connected);

        let result = session.set_heartbeat_interval(Some(Duration::from_secs(3600)));
        assert!(matches!(result, Err(ClientError::Config(_))));
        assert_eq!(
            session.inner.state.lock().heartbeat_interval,
            Some(Duration::from_secs(1))
        );
        assert!(session.inner.state.lock().heartbeat.is_some());

        session
            .set_heartbeat_interval(Some(Duration::from_secs(60)))
            .unwrap();
        assert_eq!(
            session.inner.state.lock().heartbeat_interval,
            Some(Duration::from_secs(60))
        );

        session.set_heartbeat_interval(None).unwrap();
        assert!(session.inner.state.lock().heartbeat.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_setter_allows_long_intervals_off_serial() {
        let (session, _) = session(ClientConfig {
            link: LinkKind::Tcp,
            heartbeat_interval_ms: Some(0),
            ..Default::default()
        });
        session
            .set_heartbeat_interval(Some(Duration::from_secs(3600)))
            .unwrap();
        assert_eq!(
            session.inner.state.lock().heartbeat_interval,
            Some(Duration::from_secs(3600))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_raw_send_never_reaches_queue() {
        let (session, _) = session(ClientConfig {
            heartbeat_interval_ms: Some(0),
            ..Default::default()
        });
        let result = session.send_raw(vec![0u8; MAX_PAYLOAD_SIZE + 1], 1).await;
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::PayloadTooLarge { .. }))
        ));
        assert!(session.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_drops_pending_packets() {
        let (session, _) = session(ClientConfig {
            heartbeat_interval_ms: Some(0),
            ..Default::default()
        });
        session.update_device_status(DeviceStatus::Connected);
        let handle = session.queue().enqueue(5, ToRadio::heartbeat().encode_to_vec());
        session.disconnect().await.unwrap();
        assert!(matches!(
            handle.wait().await,
            Err(ClientError::Dropped { id: 5 })
        ));
    }
}
