//! Outbound envelopes (host → device).

use crate::types::{Heartbeat, MeshPacket, XModem};

/// Top-level message written by the host to the device.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ToRadio {
    #[prost(oneof = "to_radio::PayloadVariant", tags = "1, 3, 4, 5, 6, 7")]
    pub payload_variant: Option<to_radio::PayloadVariant>,
}

/// Nested types for [`ToRadio`].
pub mod to_radio {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum PayloadVariant {
        /// A packet to send into the mesh (or to the local node).
        #[prost(message, tag = "1")]
        Packet(super::MeshPacket),
        /// Start a config download; echoed back in `config_complete_id`.
        #[prost(uint32, tag = "3")]
        WantConfigId(u32),
        /// Tell the device this client is going away.
        #[prost(bool, tag = "4")]
        Disconnect(bool),
        #[prost(message, tag = "5")]
        XmodemPacket(super::XModem),
        #[prost(bytes, tag = "6")]
        MqttClientProxyMessage(Vec<u8>),
        /// Keep-alive for links that idle out.
        #[prost(message, tag = "7")]
        Heartbeat(super::Heartbeat),
    }
}

impl ToRadio {
    /// Wrap a mesh packet.
    pub fn packet(packet: MeshPacket) -> Self {
        Self::from_variant(to_radio::PayloadVariant::Packet(packet))
    }

    /// Request the full configuration, tagged with `config_id`.
    pub fn want_config(config_id: u32) -> Self {
        Self::from_variant(to_radio::PayloadVariant::WantConfigId(config_id))
    }

    /// A keep-alive.
    pub fn heartbeat() -> Self {
        Self::from_variant(to_radio::PayloadVariant::Heartbeat(Heartbeat::default()))
    }

    /// Wrap an XModem control packet.
    pub fn xmodem(packet: XModem) -> Self {
        Self::from_variant(to_radio::PayloadVariant::XmodemPacket(packet))
    }

    fn from_variant(variant: to_radio::PayloadVariant) -> Self {
        ToRadio {
            payload_variant: Some(variant),
        }
    }

    /// Whether the device never acknowledges this envelope.
    ///
    /// Heartbeats, config requests and XModem envelopes get no routing ack,
    /// so a queued copy that times out counts as delivered.
    pub fn expects_no_ack(&self) -> bool {
        matches!(
            self.payload_variant,
            Some(to_radio::PayloadVariant::Heartbeat(_))
                | Some(to_radio::PayloadVariant::WantConfigId(_))
                | Some(to_radio::PayloadVariant::XmodemPacket(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_want_config_encoding() {
        let bytes = ToRadio::want_config(1).encode_to_vec();
        // field 3, varint
        assert_eq!(bytes, vec![0x18, 0x01]);
    }

    #[test]
    fn test_expects_no_ack() {
        assert!(ToRadio::heartbeat().expects_no_ack());
        assert!(ToRadio::want_config(9).expects_no_ack());
        assert!(!ToRadio::packet(MeshPacket::default()).expects_no_ack());
        assert!(ToRadio::xmodem(XModem::default()).expects_no_ack());
    }

    #[test]
    fn test_heartbeat_survives_round_trip() {
        let bytes = ToRadio::heartbeat().encode_to_vec();
        // An empty heartbeat still encodes its (empty) field so the variant is kept.
        assert_eq!(bytes, vec![0x3A, 0x00]);
        let decoded = ToRadio::decode(bytes.as_slice()).unwrap();
        assert!(decoded.expects_no_ack());
    }
}
