//! Inbound dispatch: `FromRadio` envelopes to [`DeviceEvent`]s.

use chrono::{DateTime, Utc};
use meshlink_metrics::metric_defs;
use meshlink_protocol::{
    admin_message, from_radio, mesh_packet, routing, AdminMessage, Data, DecodedFrame,
    DeviceMetadata, FromRadio, MeshPacket, Message, NodeInfo, PortNum, Position, ProtocolError,
    RouteDiscovery, Routing, Telemetry, User, Waypoint, BROADCAST_NUM,
};
use tracing::{debug, error, trace, warn};

use super::DeviceSession;
use crate::config::FirmwareVersion;
use crate::error::{ClientError, Result};
use crate::events::{DestinationKind, DeviceEvent, DeviceStatus, PacketMetadata};
use crate::transport::DeviceOutput;

impl DeviceSession {
    /// Process raw bytes read from a stream transport.
    ///
    /// Every complete frame is dispatched even if an earlier one fails; the
    /// first failure is returned.
    pub fn feed(&self, bytes: &[u8]) -> Result<()> {
        let frames = self.inner.decoder.lock().feed(bytes);
        let mut first_error = None;
        for frame in frames {
            if let DecodedFrame::Packet(_) = frame {
                metrics::counter!(metric_defs::FRAME_DECODED.name, &self.inner.labels.to_labels())
                    .increment(1);
            }
            if let Err(e) = self.handle_output(frame.into()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Process one item delivered by a transport.
    pub fn handle_output(&self, output: DeviceOutput) -> Result<()> {
        match output {
            DeviceOutput::Packet(bytes) => self.handle_from_radio(&bytes),
            DeviceOutput::Debug(text) => {
                trace!("device: {}", text.trim_end());
                metrics::counter!(
                    metric_defs::FRAME_DEBUG_BYTES.name,
                    &self.inner.labels.to_labels()
                )
                .increment(text.len() as u64);
                self.publish(DeviceEvent::DebugLog(text));
                Ok(())
            }
            DeviceOutput::Status { status, reason } => {
                if let Some(reason) = reason {
                    debug!("DeviceSession: transport reports {:?}: {}", status, reason);
                }
                self.update_device_status(status);
                Ok(())
            }
        }
    }

    fn handle_from_radio(&self, bytes: &[u8]) -> Result<()> {
        let message = match FromRadio::decode_frame(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("DeviceSession: dropping undecodable FromRadio ({} bytes): {}", bytes.len(), e);
                metrics::counter!(
                    metric_defs::FRAME_UNDECODABLE.name,
                    &self.inner.labels.to_labels()
                )
                .increment(1);
                return Ok(());
            }
        };
        self.dispatch(message)
    }

    /// Publish a decoded envelope and route its payload.
    pub fn dispatch(&self, message: FromRadio) -> Result<()> {
        self.publish(DeviceEvent::FromRadio(message.clone()));

        let Some(variant) = message.payload_variant else {
            warn!("DeviceSession: FromRadio {} carries no payload", message.id);
            return Ok(());
        };

        use from_radio::PayloadVariant as V;
        match variant {
            V::Packet(packet) => return self.handle_mesh_packet(packet),
            V::MyInfo(info) => {
                debug!("DeviceSession: connected to node {:#010x}", info.my_node_num);
                self.inner.state.lock().my_node_info = Some(info.clone());
                self.publish(DeviceEvent::MyNodeInfo(info));
            }
            V::NodeInfo(node) => self.handle_node_info(node),
            V::Config(config) => self.publish(DeviceEvent::Config(config)),
            V::ModuleConfig(config) => self.publish(DeviceEvent::ModuleConfig(config)),
            V::Channel(channel) => self.publish(DeviceEvent::Channel(channel)),
            V::LogRecord(record) => self.publish(DeviceEvent::LogRecord(record)),
            V::QueueStatus(status) => self.publish(DeviceEvent::QueueStatus(status)),
            V::ClientNotification(notice) => {
                self.publish(DeviceEvent::ClientNotification(notice))
            }
            V::ConfigCompleteId(id) => self.handle_config_complete(id),
            V::Rebooted(_) => {
                warn!("DeviceSession: device rebooted, reconfiguring");
                let session = self.clone();
                self.spawn_task("reconfigure", async move {
                    if let Err(e) = session.configure().await {
                        warn!("DeviceSession: reconfigure after reboot failed: {}", e);
                    }
                });
            }
            V::XmodemPacket(packet) => {
                let session = self.clone();
                self.spawn_task("xmodem reply", async move {
                    if let Err(e) = session.inner.xmodem.handle_packet(&session, packet).await {
                        warn!("DeviceSession: xmodem reply failed: {}", e);
                    }
                });
            }
            V::Metadata(metadata) => {
                self.check_firmware(&metadata);
                self.publish(DeviceEvent::Metadata(metadata));
            }
            V::MqttClientProxyMessage(bytes) => {
                debug!("DeviceSession: ignoring {} byte MQTT proxy message", bytes.len());
            }
        }
        Ok(())
    }

    fn handle_config_complete(&self, id: u32) {
        self.publish(DeviceEvent::ConfigComplete(id));

        let handshake = {
            let mut state = self.inner.state.lock();
            if id != state.session.config_id {
                error!(
                    "DeviceSession: config complete id {} does not match requested {}",
                    id, state.session.config_id
                );
                return;
            }
            if state.status != DeviceStatus::Configuring {
                debug!("DeviceSession: config complete {} outside of a handshake", id);
                return;
            }
            state.session.is_configured = true;
            state.handshake_packet.take()
        };

        self.update_device_status(DeviceStatus::Configured);
        if let Some(packet) = handshake {
            self.inner.queue.process_ack(packet);
        }
    }

    fn check_firmware(&self, metadata: &DeviceMetadata) {
        match metadata.firmware_version.parse::<FirmwareVersion>() {
            Ok(version) if version < self.inner.min_firmware => error!(
                "DeviceSession: device firmware {} is older than the minimum supported {}, update the device",
                metadata.firmware_version, self.inner.min_firmware
            ),
            Ok(_) => {}
            Err(_) => warn!(
                "DeviceSession: unparseable firmware version {:?}",
                metadata.firmware_version
            ),
        }
    }

    fn handle_node_info(&self, node: NodeInfo) {
        let envelope = PacketMetadata {
            id: 0,
            rx_time: timestamp(node.last_heard),
            destination: DestinationKind::Direct,
            from: node.num,
            to: self.my_node_num(),
            channel: node.channel,
            data: (),
        };
        if let Some(position) = node.position.clone() {
            self.publish(DeviceEvent::Position(envelope.clone().map(|_| position)));
        }
        if let Some(user) = node.user.clone() {
            self.publish(DeviceEvent::User(envelope.map(|_| user)));
        }
        self.publish(DeviceEvent::NodeInfo(node));
    }

    // ========================================================================
    // Mesh packets
    // ========================================================================

    pub(super) fn handle_mesh_packet(&self, packet: MeshPacket) -> Result<()> {
        self.publish(DeviceEvent::MeshPacket(packet.clone()));
        if packet.from != self.my_node_num() {
            self.publish(DeviceEvent::MeshHeartbeat(Utc::now()));
        }

        match &packet.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => {
                let result = self.handle_decoded(&packet, data);
                if result.is_err() {
                    metrics::counter!(
                        metric_defs::SESSION_DISPATCH_ERRORS.name,
                        &self.inner.labels.to_labels()
                    )
                    .increment(1);
                }
                result
            }
            Some(mesh_packet::PayloadVariant::Encrypted(bytes)) => {
                debug!(
                    "DeviceSession: packet {} from {:#010x} is encrypted ({} bytes), not decoding",
                    packet.id,
                    packet.from,
                    bytes.len()
                );
                Ok(())
            }
            None => {
                warn!("DeviceSession: packet {} has no payload", packet.id);
                Ok(())
            }
        }
    }

    fn handle_decoded(&self, packet: &MeshPacket, data: &Data) -> Result<()> {
        let port = PortNum::try_from(data.portnum)
            .map_err(|_| ProtocolError::UnknownPort(data.portnum))?;
        let envelope = metadata(packet, ());
        let payload = data.payload.as_slice();
        trace!(id = packet.id, ?port, "dispatching packet");

        match port {
            PortNum::TextMessageApp => {
                let text = String::from_utf8_lossy(payload).into_owned();
                self.publish(DeviceEvent::Message(envelope.map(|_| text)));
            }
            PortNum::PositionApp => {
                let position = decode::<Position>(payload)?;
                self.publish(DeviceEvent::Position(envelope.map(|_| position)));
            }
            PortNum::NodeinfoApp => {
                let user = decode::<User>(payload)?;
                self.publish(DeviceEvent::User(envelope.map(|_| user)));
            }
            PortNum::RoutingApp => {
                let routing = decode::<Routing>(payload)?;
                self.resolve_routing(data.request_id, &routing);
                self.publish(DeviceEvent::Routing(envelope.map(|_| routing)));
            }
            PortNum::AdminApp => {
                let admin = decode::<AdminMessage>(payload)?;
                self.publish(DeviceEvent::Admin(envelope.clone().map(|_| admin.clone())));
                self.dispatch_admin(admin, envelope);
            }
            PortNum::WaypointApp => {
                let waypoint = decode::<Waypoint>(payload)?;
                self.publish(DeviceEvent::Waypoint(envelope.map(|_| waypoint)));
            }
            PortNum::TelemetryApp => {
                let telemetry = decode::<Telemetry>(payload)?;
                self.publish(DeviceEvent::Telemetry(envelope.map(|_| telemetry)));
            }
            PortNum::TracerouteApp => {
                let route = decode::<RouteDiscovery>(payload)?;
                self.publish(DeviceEvent::Traceroute(envelope.map(|_| route)));
            }
            other => {
                let bytes = data.payload.clone();
                self.publish(DeviceEvent::AppPacket {
                    port: other,
                    packet: envelope.map(|_| bytes),
                });
            }
        }
        Ok(())
    }

    /// Settle the queued packet a routing reply refers to.
    fn resolve_routing(&self, request_id: u32, routing: &Routing) {
        let Some(routing::Variant::ErrorReason(code)) = routing.variant else {
            return;
        };
        if code == routing::Error::None as i32 {
            if self.inner.queue.process_ack(request_id) {
                trace!(id = request_id, "routing ack");
            }
        } else {
            let reason = routing::Error::try_from(code)
                .map(|e| format!("{:?}", e))
                .unwrap_or_else(|_| code.to_string());
            warn!("DeviceSession: packet {} failed with routing error {}", request_id, reason);
            self.inner
                .queue
                .process_error(request_id, ClientError::Routing { id: request_id, code });
        }
    }

    fn dispatch_admin(&self, admin: AdminMessage, envelope: PacketMetadata<()>) {
        use admin_message::PayloadVariant as A;
        match admin.payload_variant {
            Some(A::GetChannelResponse(channel)) => self.publish(DeviceEvent::Channel(channel)),
            Some(A::GetOwnerResponse(user)) => {
                self.publish(DeviceEvent::User(envelope.map(|_| user)))
            }
            Some(A::GetConfigResponse(config)) => self.publish(DeviceEvent::Config(config)),
            Some(A::GetModuleConfigResponse(config)) => {
                self.publish(DeviceEvent::ModuleConfig(config))
            }
            Some(A::GetDeviceMetadataResponse(metadata)) => {
                self.publish(DeviceEvent::Metadata(metadata))
            }
            Some(A::GetCannedMessageModuleMessagesResponse(messages)) => {
                self.publish(DeviceEvent::CannedMessages(messages))
            }
            other => warn!("DeviceSession: unhandled admin message {:?}", other),
        }
    }
}

fn decode<M: Message + Default>(payload: &[u8]) -> Result<M> {
    M::decode(payload).map_err(|e| ClientError::Protocol(e.into()))
}

/// Seconds since the epoch, with zero meaning "now".
fn timestamp(seconds: u32) -> DateTime<Utc> {
    if seconds == 0 {
        return Utc::now();
    }
    DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_else(Utc::now)
}

fn metadata<T>(packet: &MeshPacket, data: T) -> PacketMetadata<T> {
    PacketMetadata {
        id: packet.id,
        rx_time: timestamp(packet.rx_time),
        destination: if packet.to == BROADCAST_NUM {
            DestinationKind::Broadcast
        } else {
            DestinationKind::Direct
        },
        from: packet.from,
        to: packet.to,
        channel: packet.channel,
        data,
    }
}
