//! Mesh message types.
//!
//! Hand-maintained protobuf definitions for the subset of the device schema
//! the client core branches on. Field numbers follow the device firmware;
//! fields not listed here are skipped by the decoder.

/// Application-level message type tag carried in [`Data::portnum`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PortNum {
    /// Unset or deliberately unknown application.
    UnknownApp = 0,
    /// UTF-8 text message.
    TextMessageApp = 1,
    /// GPIO control of a remote node.
    RemoteHardwareApp = 2,
    /// [`Position`] update.
    PositionApp = 3,
    /// [`User`] (owner) information.
    NodeinfoApp = 4,
    /// [`Routing`] acks, naks and route discovery.
    RoutingApp = 5,
    /// [`AdminMessage`](crate::AdminMessage) for remote or local administration.
    AdminApp = 6,
    /// Unishox2-compressed text.
    TextMessageCompressedApp = 7,
    /// [`Waypoint`] broadcast.
    WaypointApp = 8,
    /// Codec2 audio frames.
    AudioApp = 9,
    /// Detection sensor state change.
    DetectionSensorApp = 10,
    /// Critical alert text.
    AlertApp = 11,
    /// Ping/reply service.
    ReplyApp = 32,
    /// IP tunnel packets.
    IpTunnelApp = 33,
    /// Paxcounter reports.
    PaxcounterApp = 34,
    /// Serial module passthrough.
    SerialApp = 64,
    /// Store and forward module.
    StoreForwardApp = 65,
    /// Range test module.
    RangeTestApp = 66,
    /// [`Telemetry`] reports.
    TelemetryApp = 67,
    /// Zero-GPS positioning estimates.
    ZpsApp = 68,
    /// Simulator-only traffic.
    SimulatorApp = 69,
    /// [`RouteDiscovery`] traceroute.
    TracerouteApp = 70,
    /// Neighbor information.
    NeighborinfoApp = 71,
    /// ATAK plugin payloads.
    AtakPlugin = 72,
    /// Map reports.
    MapReportApp = 73,
    /// Power stress testing.
    PowerstressApp = 74,
    /// Private application range start.
    PrivateApp = 256,
    /// ATAK forwarder.
    AtakForwarder = 257,
}

/// A packet travelling over the mesh.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MeshPacket {
    /// Sending node number.
    #[prost(fixed32, tag = "1")]
    pub from: u32,
    /// Destination node number, [`BROADCAST_NUM`](crate::BROADCAST_NUM) for everyone.
    #[prost(fixed32, tag = "2")]
    pub to: u32,
    /// Channel index the packet was sent on.
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    /// Packet id, unique per sender.
    #[prost(fixed32, tag = "6")]
    pub id: u32,
    /// Receive time, seconds since the Unix epoch.
    #[prost(fixed32, tag = "7")]
    pub rx_time: u32,
    #[prost(float, tag = "8")]
    pub rx_snr: f32,
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
    /// Ask the receiver for a routing ack.
    #[prost(bool, tag = "10")]
    pub want_ack: bool,
    #[prost(int32, tag = "12")]
    pub rx_rssi: i32,
    #[prost(bool, tag = "14")]
    pub via_mqtt: bool,
    #[prost(uint32, tag = "15")]
    pub hop_start: u32,
    #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
    pub payload_variant: Option<mesh_packet::PayloadVariant>,
}

/// Nested types for [`MeshPacket`].
pub mod mesh_packet {
    /// Packet body: decoded application data or an opaque encrypted blob.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum PayloadVariant {
        #[prost(message, tag = "4")]
        Decoded(super::Data),
        #[prost(bytes, tag = "5")]
        Encrypted(Vec<u8>),
    }
}

/// Decoded application payload of a [`MeshPacket`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct Data {
    #[prost(enumeration = "PortNum", tag = "1")]
    pub portnum: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    #[prost(fixed32, tag = "4")]
    pub dest: u32,
    #[prost(fixed32, tag = "5")]
    pub source: u32,
    /// Id of the packet this one answers (acks and responses).
    #[prost(fixed32, tag = "6")]
    pub request_id: u32,
    #[prost(fixed32, tag = "7")]
    pub reply_id: u32,
    #[prost(fixed32, tag = "8")]
    pub emoji: u32,
}

/// Routing control message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Routing {
    #[prost(oneof = "routing::Variant", tags = "1, 2, 3")]
    pub variant: Option<routing::Variant>,
}

/// Nested types for [`Routing`].
pub mod routing {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Variant {
        #[prost(message, tag = "1")]
        RouteRequest(super::RouteDiscovery),
        #[prost(message, tag = "2")]
        RouteReply(super::RouteDiscovery),
        /// Delivery outcome for the packet named by `Data::request_id`.
        #[prost(enumeration = "Error", tag = "3")]
        ErrorReason(i32),
    }

    /// Delivery failure reasons reported by the device.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Error {
        None = 0,
        NoRoute = 1,
        GotNak = 2,
        Timeout = 3,
        NoInterface = 4,
        MaxRetransmit = 5,
        NoChannel = 6,
        TooLarge = 7,
        NoResponse = 8,
        DutyCycleLimit = 9,
        BadRequest = 32,
        NotAuthorized = 33,
        PkiFailed = 34,
        PkiUnknownPubkey = 35,
        AdminBadSessionKey = 36,
        AdminPublicKeyUnauthorized = 37,
    }
}

/// Route taken by a traceroute request and its reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RouteDiscovery {
    #[prost(fixed32, repeated, tag = "1")]
    pub route: Vec<u32>,
    #[prost(int32, repeated, tag = "2")]
    pub snr_towards: Vec<i32>,
    #[prost(fixed32, repeated, tag = "3")]
    pub route_back: Vec<u32>,
    #[prost(int32, repeated, tag = "4")]
    pub snr_back: Vec<i32>,
}

/// Owner information for a node.
#[derive(Clone, PartialEq, prost::Message)]
pub struct User {
    /// Globally unique id, conventionally `!` followed by the hex node number.
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub long_name: String,
    #[prost(string, tag = "3")]
    pub short_name: String,
    #[prost(int32, tag = "5")]
    pub hw_model: i32,
    #[prost(bool, tag = "6")]
    pub is_licensed: bool,
    #[prost(int32, tag = "7")]
    pub role: i32,
    #[prost(bytes = "vec", tag = "8")]
    pub public_key: Vec<u8>,
}

/// A position report. Coordinates are degrees scaled by 1e7.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Position {
    #[prost(sfixed32, optional, tag = "1")]
    pub latitude_i: Option<i32>,
    #[prost(sfixed32, optional, tag = "2")]
    pub longitude_i: Option<i32>,
    /// Meters above mean sea level.
    #[prost(int32, optional, tag = "3")]
    pub altitude: Option<i32>,
    #[prost(fixed32, tag = "4")]
    pub time: u32,
    #[prost(uint32, tag = "23")]
    pub precision_bits: u32,
}

/// Our own node's identity, sent first during the config download.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MyNodeInfo {
    #[prost(uint32, tag = "1")]
    pub my_node_num: u32,
    #[prost(uint32, tag = "8")]
    pub reboot_count: u32,
    #[prost(uint32, tag = "11")]
    pub min_app_version: u32,
    #[prost(bytes = "vec", tag = "12")]
    pub device_id: Vec<u8>,
    #[prost(string, tag = "13")]
    pub pio_env: String,
}

/// A node database entry.
#[derive(Clone, PartialEq, prost::Message)]
pub struct NodeInfo {
    #[prost(uint32, tag = "1")]
    pub num: u32,
    #[prost(message, optional, tag = "2")]
    pub user: Option<User>,
    #[prost(message, optional, tag = "3")]
    pub position: Option<Position>,
    #[prost(float, tag = "4")]
    pub snr: f32,
    #[prost(fixed32, tag = "5")]
    pub last_heard: u32,
    #[prost(message, optional, tag = "6")]
    pub device_metrics: Option<DeviceMetrics>,
    #[prost(uint32, tag = "7")]
    pub channel: u32,
    #[prost(bool, tag = "8")]
    pub via_mqtt: bool,
    #[prost(uint32, optional, tag = "9")]
    pub hops_away: Option<u32>,
    #[prost(bool, tag = "10")]
    pub is_favorite: bool,
}

/// Battery and airtime figures reported by a node.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceMetrics {
    #[prost(uint32, optional, tag = "1")]
    pub battery_level: Option<u32>,
    #[prost(float, optional, tag = "2")]
    pub voltage: Option<f32>,
    #[prost(float, optional, tag = "3")]
    pub channel_utilization: Option<f32>,
    #[prost(float, optional, tag = "4")]
    pub air_util_tx: Option<f32>,
    #[prost(uint32, optional, tag = "5")]
    pub uptime_seconds: Option<u32>,
}

/// Telemetry report. Only device metrics are decoded; other kinds stay opaque.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Telemetry {
    #[prost(fixed32, tag = "1")]
    pub time: u32,
    #[prost(oneof = "telemetry::Variant", tags = "2, 3, 4, 5, 6")]
    pub variant: Option<telemetry::Variant>,
}

/// Nested types for [`Telemetry`].
pub mod telemetry {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Variant {
        #[prost(message, tag = "2")]
        DeviceMetrics(super::DeviceMetrics),
        #[prost(bytes, tag = "3")]
        EnvironmentMetrics(Vec<u8>),
        #[prost(bytes, tag = "4")]
        AirQualityMetrics(Vec<u8>),
        #[prost(bytes, tag = "5")]
        PowerMetrics(Vec<u8>),
        #[prost(bytes, tag = "6")]
        LocalStats(Vec<u8>),
    }
}

/// A named map point shared on the mesh.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Waypoint {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(sfixed32, optional, tag = "2")]
    pub latitude_i: Option<i32>,
    #[prost(sfixed32, optional, tag = "3")]
    pub longitude_i: Option<i32>,
    #[prost(uint32, tag = "4")]
    pub expire: u32,
    #[prost(uint32, tag = "5")]
    pub locked_to: u32,
    #[prost(string, tag = "6")]
    pub name: String,
    #[prost(string, tag = "7")]
    pub description: String,
    #[prost(fixed32, tag = "8")]
    pub icon: u32,
}

/// A channel slot on the device.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Channel {
    #[prost(int32, tag = "1")]
    pub index: i32,
    #[prost(message, optional, tag = "2")]
    pub settings: Option<ChannelSettings>,
    #[prost(enumeration = "channel::Role", tag = "3")]
    pub role: i32,
}

/// Nested types for [`Channel`].
pub mod channel {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Role {
        Disabled = 0,
        Primary = 1,
        Secondary = 2,
    }
}

/// Radio-independent settings of a channel.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ChannelSettings {
    #[prost(bytes = "vec", tag = "2")]
    pub psk: Vec<u8>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(fixed32, tag = "4")]
    pub id: u32,
    #[prost(bool, tag = "5")]
    pub uplink_enabled: bool,
    #[prost(bool, tag = "6")]
    pub downlink_enabled: bool,
}

/// Free space in the device's outbound queue.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueueStatus {
    #[prost(int32, tag = "1")]
    pub res: i32,
    #[prost(uint32, tag = "2")]
    pub free: u32,
    #[prost(uint32, tag = "3")]
    pub maxlen: u32,
    #[prost(uint32, tag = "4")]
    pub mesh_packet_id: u32,
}

/// A structured log line from the firmware.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogRecord {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(fixed32, tag = "2")]
    pub time: u32,
    #[prost(string, tag = "3")]
    pub source: String,
    #[prost(enumeration = "log_record::Level", tag = "4")]
    pub level: i32,
}

/// Nested types for [`LogRecord`].
pub mod log_record {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Level {
        Unset = 0,
        Trace = 5,
        Debug = 10,
        Info = 20,
        Warning = 30,
        Error = 40,
        Critical = 50,
    }
}

/// Firmware and capability description of the device.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceMetadata {
    /// Dotted version string, e.g. `2.3.15.deb7c27`.
    #[prost(string, tag = "1")]
    pub firmware_version: String,
    #[prost(uint32, tag = "2")]
    pub device_state_version: u32,
    #[prost(bool, tag = "3")]
    pub can_shutdown: bool,
    #[prost(bool, tag = "4")]
    pub has_wifi: bool,
    #[prost(bool, tag = "5")]
    pub has_bluetooth: bool,
    #[prost(bool, tag = "6")]
    pub has_ethernet: bool,
    #[prost(int32, tag = "7")]
    pub role: i32,
    #[prost(uint32, tag = "8")]
    pub position_flags: u32,
    #[prost(int32, tag = "9")]
    pub hw_model: i32,
    #[prost(bool, tag = "10")]
    pub has_remote_hardware: bool,
}

/// A user-facing notice raised by the firmware.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ClientNotification {
    #[prost(uint32, optional, tag = "1")]
    pub reply_id: Option<u32>,
    #[prost(fixed32, tag = "2")]
    pub time: u32,
    #[prost(enumeration = "log_record::Level", tag = "3")]
    pub level: i32,
    #[prost(string, tag = "4")]
    pub message: String,
}

/// XModem control packet, carried inside the envelopes.
#[derive(Clone, PartialEq, prost::Message)]
pub struct XModem {
    #[prost(enumeration = "x_modem::Control", tag = "1")]
    pub control: i32,
    #[prost(uint32, tag = "2")]
    pub seq: u32,
    #[prost(uint32, tag = "3")]
    pub crc16: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub buffer: Vec<u8>,
}

/// Nested types for [`XModem`].
pub mod x_modem {
    /// Classic XModem control characters.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Control {
        Nul = 0,
        Soh = 1,
        Stx = 2,
        Eot = 4,
        Ack = 6,
        Nak = 21,
        Can = 24,
        Ctrlz = 26,
    }
}

impl XModem {
    /// Build a control packet.
    pub fn new(control: x_modem::Control, seq: u32, crc16: u32, buffer: Vec<u8>) -> Self {
        XModem {
            control: control as i32,
            seq,
            crc16,
            buffer,
        }
    }

    /// Control code, or `None` for values outside the protocol.
    pub fn control_code(&self) -> Option<x_modem::Control> {
        x_modem::Control::try_from(self.control).ok()
    }
}

/// Keep-alive with no payload of its own.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Heartbeat {
    #[prost(uint32, tag = "1")]
    pub nonce: u32,
}

impl MeshPacket {
    /// The decoded payload, if the packet is not encrypted.
    pub fn decoded(&self) -> Option<&Data> {
        match &self.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => Some(data),
            _ => None,
        }
    }
}
