//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshlink_client::protocol::{
    from_radio, mesh_packet, routing, to_radio, AdminMessage, Data, FrameCodec, FromRadio,
    MeshPacket, Message, MyNodeInfo, PortNum, Routing, ToRadio,
};
use meshlink_client::{
    ClientConfig, DeviceEvent, DeviceSession, DeviceStatus, Transport, TransportError,
    TransportErrorKind,
};
use parking_lot::Mutex;

pub const CONFIG_ID: u32 = 0x00C0_FFEE;
pub const MY_NODE: u32 = 0x1111_2222;
pub const OTHER_NODE: u32 = 0x3333_4444;

/// Records every write; failures can be scripted per write.
#[derive(Default)]
pub struct MockTransport {
    writes: Mutex<Vec<Vec<u8>>>,
    failures: Mutex<VecDeque<TransportErrorKind>>,
    disconnects: Mutex<usize>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next write with `kind`.
    pub fn fail_next(&self, kind: TransportErrorKind) {
        self.failures.lock().push_back(kind);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnects.lock()
    }

    /// Every successful write, unframed and decoded.
    pub fn sent(&self) -> Vec<ToRadio> {
        let mut codec = FrameCodec::new();
        self.writes
            .lock()
            .iter()
            .flat_map(|frame| codec.feed(frame))
            .map(|item| match item {
                meshlink_client::protocol::DecodedFrame::Packet(bytes) => {
                    ToRadio::decode(bytes.as_slice()).expect("written frame is a ToRadio")
                }
                other => panic!("unexpected debug output in writes: {:?}", other),
            })
            .collect()
    }

    /// Mesh packets among the writes, in order.
    pub fn sent_packets(&self) -> Vec<MeshPacket> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message.payload_variant {
                Some(to_radio::PayloadVariant::Packet(packet)) => Some(packet),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if let Some(kind) = self.failures.lock().pop_front() {
            return Err(TransportError::new(kind, "scripted failure"));
        }
        self.writes.lock().push(data);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        *self.disconnects.lock() += 1;
        Ok(())
    }
}

pub type EventLog = Arc<Mutex<Vec<DeviceEvent>>>;

/// Fixed config id, no heartbeat.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        config_id: Some(CONFIG_ID),
        heartbeat_interval_ms: Some(0),
        ..Default::default()
    }
}

pub fn setup() -> (DeviceSession, Arc<MockTransport>, EventLog) {
    setup_with(test_config())
}

/// Route crate logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn setup_with(config: ClientConfig) -> (DeviceSession, Arc<MockTransport>, EventLog) {
    init_tracing();
    let transport = MockTransport::new();
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = events.clone();
        move |event: DeviceEvent| events.lock().push(event)
    };
    let session = DeviceSession::new(config, transport.clone(), Arc::new(sink))
        .expect("test config is valid");
    (session, transport, events)
}

/// Setup plus a known local node number.
pub fn setup_connected() -> (DeviceSession, Arc<MockTransport>, EventLog) {
    let (session, transport, events) = setup();
    session.update_device_status(DeviceStatus::Connected);
    session
        .feed(&frame(from_radio::PayloadVariant::MyInfo(MyNodeInfo {
            my_node_num: MY_NODE,
            ..Default::default()
        })))
        .expect("my_info dispatches");
    (session, transport, events)
}

/// A framed `FromRadio` carrying `variant`.
pub fn frame(variant: from_radio::PayloadVariant) -> Vec<u8> {
    let message = FromRadio {
        id: 1,
        payload_variant: Some(variant),
    };
    FrameCodec::encode(&message.encode_to_vec()).expect("fits in a frame")
}

/// A framed mesh packet from `OTHER_NODE` to `MY_NODE`.
pub fn packet_frame(port: i32, payload: Vec<u8>, request_id: u32) -> Vec<u8> {
    frame(from_radio::PayloadVariant::Packet(MeshPacket {
        from: OTHER_NODE,
        to: MY_NODE,
        id: 4242,
        rx_time: 1_700_000_000,
        payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
            portnum: port,
            payload,
            request_id,
            ..Default::default()
        })),
        ..Default::default()
    }))
}

/// A framed routing reply for `request_id` with `code` (0 = ack).
pub fn routing_frame(request_id: u32, code: routing::Error) -> Vec<u8> {
    let routing = Routing {
        variant: Some(routing::Variant::ErrorReason(code as i32)),
    };
    packet_frame(
        PortNum::RoutingApp as i32,
        routing.encode_to_vec(),
        request_id,
    )
}

/// Decode the admin payload of a written mesh packet.
pub fn admin_of(packet: &MeshPacket) -> AdminMessage {
    let data = packet.decoded().expect("decoded packet");
    assert_eq!(data.portnum, PortNum::AdminApp as i32);
    AdminMessage::decode(data.payload.as_slice()).expect("admin payload")
}

pub fn status_events(events: &EventLog) -> Vec<DeviceStatus> {
    events
        .lock()
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::StatusChanged(status) => Some(*status),
            _ => None,
        })
        .collect()
}

/// Long enough for one paced write to go out.
pub const ONE_WRITE: Duration = Duration::from_millis(300);
