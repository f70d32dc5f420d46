//! Inbound envelopes (device → host).

use prost::Message;

use crate::error::ProtocolError;

/// Top-level message read from the device.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FromRadio {
    /// Monotonic id assigned by the device, informational only.
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(
        oneof = "from_radio::PayloadVariant",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 16"
    )]
    pub payload_variant: Option<from_radio::PayloadVariant>,
}

/// Nested types for [`FromRadio`].
pub mod from_radio {
    use crate::types::{
        Channel, ClientNotification, DeviceMetadata, LogRecord, MeshPacket, MyNodeInfo, NodeInfo,
        QueueStatus, XModem,
    };

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum PayloadVariant {
        #[prost(message, tag = "2")]
        Packet(MeshPacket),
        #[prost(message, tag = "3")]
        MyInfo(MyNodeInfo),
        #[prost(message, tag = "4")]
        NodeInfo(NodeInfo),
        /// Device configuration section, kept as its encoded form.
        #[prost(bytes, tag = "5")]
        Config(Vec<u8>),
        #[prost(message, tag = "6")]
        LogRecord(LogRecord),
        /// Echo of the id passed in `want_config_id`; ends the config download.
        #[prost(uint32, tag = "7")]
        ConfigCompleteId(u32),
        /// The device restarted and needs to be reconfigured.
        #[prost(bool, tag = "8")]
        Rebooted(bool),
        /// Module configuration section, kept as its encoded form.
        #[prost(bytes, tag = "9")]
        ModuleConfig(Vec<u8>),
        #[prost(message, tag = "10")]
        Channel(Channel),
        #[prost(message, tag = "11")]
        QueueStatus(QueueStatus),
        #[prost(message, tag = "12")]
        XmodemPacket(XModem),
        #[prost(message, tag = "13")]
        Metadata(DeviceMetadata),
        #[prost(bytes, tag = "14")]
        MqttClientProxyMessage(Vec<u8>),
        #[prost(message, tag = "16")]
        ClientNotification(ClientNotification),
    }
}

impl FromRadio {
    /// Decode the payload of one frame.
    pub fn decode_frame(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(FromRadio::decode(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::from_radio::PayloadVariant;
    use super::*;
    use crate::types::MyNodeInfo;

    #[test]
    fn test_decode_config_complete() {
        let message = FromRadio {
            id: 3,
            payload_variant: Some(PayloadVariant::ConfigCompleteId(0xABCD)),
        };
        let decoded = FromRadio::decode_frame(&message.encode_to_vec()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_my_info() {
        let message = FromRadio {
            id: 0,
            payload_variant: Some(PayloadVariant::MyInfo(MyNodeInfo {
                my_node_num: 0x1234_5678,
                ..Default::default()
            })),
        };
        let decoded = FromRadio::decode_frame(&message.encode_to_vec()).unwrap();
        match decoded.payload_variant {
            Some(PayloadVariant::MyInfo(info)) => assert_eq!(info.my_node_num, 0x1234_5678),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        // Field 2 declared as length-delimited with a length past the end.
        let result = FromRadio::decode_frame(&[0x12, 0x10, 0x01]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
