//! Events published by a [`DeviceSession`](crate::DeviceSession).
//!
//! The session only knows the [`EventSink`] trait. [`EventBus`] is a ready-made
//! sink backed by a tokio broadcast channel; closures work too.

use chrono::{DateTime, Utc};
use meshlink_protocol::{
    AdminMessage, Channel, ClientNotification, DeviceMetadata, FromRadio, LogRecord, MeshPacket,
    MyNodeInfo, NodeInfo, PortNum, Position, QueueStatus, RouteDiscovery, Routing, Telemetry,
    User, Waypoint,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::ClientConfig;

/// Connection state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    Disconnected,
    Connecting,
    Reconnecting,
    Connected,
    Configuring,
    Configured,
    Error,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Reconnecting => "reconnecting",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Configuring => "configuring",
            DeviceStatus::Configured => "configured",
            DeviceStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationKind {
    Broadcast,
    Direct,
}

/// Envelope attached to every dispatched application packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketMetadata<T> {
    pub id: u32,
    pub rx_time: DateTime<Utc>,
    pub destination: DestinationKind,
    pub from: u32,
    pub to: u32,
    pub channel: u32,
    pub data: T,
}

impl<T> PacketMetadata<T> {
    /// Swap the payload, keeping the envelope.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PacketMetadata<U> {
        PacketMetadata {
            id: self.id,
            rx_time: self.rx_time,
            destination: self.destination,
            from: self.from,
            to: self.to,
            channel: self.channel,
            data: f(self.data),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StatusChanged(DeviceStatus),
    /// Text the device printed outside of any frame.
    DebugLog(String),
    /// Every decoded envelope, before it is dispatched.
    FromRadio(FromRadio),
    MeshPacket(MeshPacket),
    /// Another node was heard from.
    MeshHeartbeat(DateTime<Utc>),
    MyNodeInfo(MyNodeInfo),
    NodeInfo(NodeInfo),
    /// Encoded device configuration section.
    Config(Vec<u8>),
    /// Encoded module configuration section.
    ModuleConfig(Vec<u8>),
    Channel(Channel),
    ConfigComplete(u32),
    LogRecord(LogRecord),
    QueueStatus(QueueStatus),
    Metadata(DeviceMetadata),
    ClientNotification(ClientNotification),
    /// An admin edit session was opened (`true`) or committed (`false`).
    PendingSettingsChange(bool),
    Message(PacketMetadata<String>),
    Position(PacketMetadata<Position>),
    User(PacketMetadata<User>),
    Routing(PacketMetadata<Routing>),
    Admin(PacketMetadata<AdminMessage>),
    Waypoint(PacketMetadata<Waypoint>),
    Telemetry(PacketMetadata<Telemetry>),
    Traceroute(PacketMetadata<RouteDiscovery>),
    CannedMessages(String),
    /// Payload for a port without a typed decoder.
    AppPacket {
        port: PortNum,
        packet: PacketMetadata<Vec<u8>>,
    },
}

/// Receiver of session events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DeviceEvent);
}

impl<F> EventSink for F
where
    F: Fn(DeviceEvent) + Send + Sync,
{
    fn publish(&self, event: DeviceEvent) {
        self(event)
    }
}

/// Fan-out of session events to any number of subscribers.
///
/// Publishing never blocks; slow subscribers observe `Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    /// A bus sized by [`ClientConfig::event_capacity`].
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.event_capacity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DeviceEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
