//! Administrative messages carried on [`PortNum::AdminApp`](crate::PortNum::AdminApp).
//!
//! Config and module-config sections are schema-versioned by the firmware and
//! travel as opaque encoded bytes; callers encode them with their own schema.

use crate::types::{Channel, DeviceMetadata, Position, User};

/// Which device configuration section a `get_config_request` asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ConfigType {
    DeviceConfig = 0,
    PositionConfig = 1,
    PowerConfig = 2,
    NetworkConfig = 3,
    DisplayConfig = 4,
    LoraConfig = 5,
    BluetoothConfig = 6,
    SecurityConfig = 7,
    SessionkeyConfig = 8,
    DeviceuiConfig = 9,
}

/// Which module configuration section a `get_module_config_request` asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ModuleConfigType {
    MqttConfig = 0,
    SerialConfig = 1,
    ExtnotifConfig = 2,
    StoreforwardConfig = 3,
    RangetestConfig = 4,
    TelemetryConfig = 5,
    CannedmsgConfig = 6,
    AudioConfig = 7,
    RemotehardwareConfig = 8,
    NeighborinfoConfig = 9,
    AmbientlightingConfig = 10,
    DetectionsensorConfig = 11,
    PaxcounterConfig = 12,
}

/// Request or response addressed to a node's admin module.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AdminMessage {
    #[prost(
        oneof = "admin_message::PayloadVariant",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 21, 32, 33, 34, 35, 36, 38, 41, 42, 64, 65, 94, 95, 97, 98, 99, 100"
    )]
    pub payload_variant: Option<admin_message::PayloadVariant>,
}

/// Nested types for [`AdminMessage`].
pub mod admin_message {
    use super::{Channel, DeviceMetadata, Position, User};

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum PayloadVariant {
        /// Channel index plus one; zero is not a valid request.
        #[prost(uint32, tag = "1")]
        GetChannelRequest(u32),
        #[prost(message, tag = "2")]
        GetChannelResponse(Channel),
        #[prost(bool, tag = "3")]
        GetOwnerRequest(bool),
        #[prost(message, tag = "4")]
        GetOwnerResponse(User),
        #[prost(enumeration = "super::ConfigType", tag = "5")]
        GetConfigRequest(i32),
        #[prost(bytes, tag = "6")]
        GetConfigResponse(Vec<u8>),
        #[prost(enumeration = "super::ModuleConfigType", tag = "7")]
        GetModuleConfigRequest(i32),
        #[prost(bytes, tag = "8")]
        GetModuleConfigResponse(Vec<u8>),
        #[prost(bool, tag = "10")]
        GetCannedMessageModuleMessagesRequest(bool),
        #[prost(string, tag = "11")]
        GetCannedMessageModuleMessagesResponse(String),
        #[prost(bool, tag = "12")]
        GetDeviceMetadataRequest(bool),
        #[prost(message, tag = "13")]
        GetDeviceMetadataResponse(DeviceMetadata),
        #[prost(bool, tag = "21")]
        EnterDfuModeRequest(bool),
        #[prost(message, tag = "32")]
        SetOwner(User),
        #[prost(message, tag = "33")]
        SetChannel(Channel),
        #[prost(bytes, tag = "34")]
        SetConfig(Vec<u8>),
        #[prost(bytes, tag = "35")]
        SetModuleConfig(Vec<u8>),
        #[prost(string, tag = "36")]
        SetCannedMessageModuleMessages(String),
        #[prost(uint32, tag = "38")]
        RemoveByNodenum(u32),
        #[prost(message, tag = "41")]
        SetFixedPosition(Position),
        #[prost(bool, tag = "42")]
        RemoveFixedPosition(bool),
        #[prost(bool, tag = "64")]
        BeginEditSettings(bool),
        #[prost(bool, tag = "65")]
        CommitEditSettings(bool),
        #[prost(int32, tag = "94")]
        FactoryResetDevice(i32),
        /// Seconds until reboot into OTA mode.
        #[prost(int32, tag = "95")]
        RebootOtaSeconds(i32),
        /// Seconds until reboot, negative cancels a pending one.
        #[prost(int32, tag = "97")]
        RebootSeconds(i32),
        #[prost(int32, tag = "98")]
        ShutdownSeconds(i32),
        #[prost(int32, tag = "99")]
        FactoryResetConfig(i32),
        #[prost(int32, tag = "100")]
        NodedbReset(i32),
    }
}

impl AdminMessage {
    /// Wrap a payload variant.
    pub fn new(variant: admin_message::PayloadVariant) -> Self {
        AdminMessage {
            payload_variant: Some(variant),
        }
    }
}
