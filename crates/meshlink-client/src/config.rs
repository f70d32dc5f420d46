//! Client configuration.
//!
//! ```yaml
//! link: serial
//! send_interval_ms: 200
//! packet_timeout_ms: 60000
//! heartbeat_interval_ms: 120000
//! min_firmware_version: "2.2"
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Serial devices drop a client that has been silent this long.
pub const SERIAL_IDLE_DISCONNECT: Duration = Duration::from_secs(15 * 60);
/// Heartbeat interval used on serial links unless configured otherwise.
pub const SERIAL_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Kind of link the session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    #[default]
    Serial,
    Bluetooth,
    Http,
    Tcp,
    WebSocket,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Serial => "serial",
            LinkKind::Bluetooth => "bluetooth",
            LinkKind::Http => "http",
            LinkKind::Tcp => "tcp",
            LinkKind::WebSocket => "websocket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub link: LinkKind,
    /// Fixed handshake id; a random one is drawn when absent.
    pub config_id: Option<u32>,
    /// Pause before each queued write.
    pub send_interval_ms: u64,
    /// How long a queued packet waits for its acknowledgement.
    pub packet_timeout_ms: u64,
    /// Pause before answering each inbound XModem packet.
    pub xmodem_delay_ms: u64,
    /// Absent means the link default, zero disables the heartbeat.
    pub heartbeat_interval_ms: Option<u64>,
    /// Oldest firmware the client is known to work with, as `major.minor`.
    pub min_firmware_version: String,
    /// Buffer size of the broadcast event bus.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            link: LinkKind::Serial,
            config_id: None,
            send_interval_ms: 200,
            packet_timeout_ms: 60_000,
            xmodem_delay_ms: 100,
            heartbeat_interval_ms: None,
            min_firmware_version: "2.2".to_string(),
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.packet_timeout_ms == 0 {
            return Err(ClientError::Config(
                "packet_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::Config(
                "event_capacity must be greater than zero".into(),
            ));
        }
        self.min_firmware()?;

        if let Some(interval) = self.heartbeat_interval() {
            self.check_heartbeat_interval(interval)?;
        }
        Ok(())
    }

    /// Serial links must beat more often than the device's idle disconnect.
    pub fn check_heartbeat_interval(&self, interval: Duration) -> Result<()> {
        if self.link == LinkKind::Serial && interval >= SERIAL_IDLE_DISCONNECT {
            return Err(ClientError::Config(format!(
                "serial heartbeat of {}s must be shorter than the {}s idle disconnect",
                interval.as_secs(),
                SERIAL_IDLE_DISCONNECT.as_secs()
            )));
        }
        Ok(())
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn packet_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_timeout_ms)
    }

    pub fn xmodem_delay(&self) -> Duration {
        Duration::from_millis(self.xmodem_delay_ms)
    }

    /// Effective heartbeat interval, `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None if self.link == LinkKind::Serial => Some(SERIAL_HEARTBEAT_INTERVAL),
            None => None,
        }
    }

    pub fn min_firmware(&self) -> Result<FirmwareVersion> {
        self.min_firmware_version.parse()
    }
}

/// A firmware release, compared on major and minor only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        FirmwareVersion { major, minor }
    }
}

impl FromStr for FirmwareVersion {
    type Err = ClientError;

    /// Parses `2.3`, `2.3.15` or `2.3.15.deb7c27`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let mut component = |name: &str| -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| ClientError::Config(format!("bad {} in firmware version {:?}", name, s)))
        };
        let major = component("major")?;
        let minor = component("minor")?;
        Ok(FirmwareVersion { major, minor })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
