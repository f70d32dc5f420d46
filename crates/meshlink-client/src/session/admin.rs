//! Application and admin operations built on [`DeviceSession::send_packet`].

use meshlink_protocol::admin_message::PayloadVariant as Admin;
use meshlink_protocol::{
    channel, AdminMessage, Channel, ChannelSettings, ConfigType, Message, ModuleConfigType,
    PortNum, Position, ProtocolError, RouteDiscovery, User, Waypoint, MAX_TEXT_LENGTH,
};
use tracing::debug;

use super::{Destination, DeviceSession, PacketOptions};
use crate::error::Result;
use crate::events::DeviceEvent;

impl DeviceSession {
    // ========================================================================
    // Application messages
    // ========================================================================

    /// Send a text message.
    pub async fn send_text(&self, text: &str, options: PacketOptions) -> Result<u32> {
        if text.len() > MAX_TEXT_LENGTH {
            return Err(ProtocolError::PayloadTooLarge {
                max: MAX_TEXT_LENGTH,
                actual: text.len(),
            }
            .into());
        }
        self.send_packet(text.as_bytes().to_vec(), PortNum::TextMessageApp, options)
            .await
    }

    pub async fn send_waypoint(&self, waypoint: Waypoint, options: PacketOptions) -> Result<u32> {
        self.send_packet(waypoint.encode_to_vec(), PortNum::WaypointApp, options)
            .await
    }

    /// Ask `node` to report the route packets take to reach it.
    pub async fn send_traceroute(&self, node: u32) -> Result<u32> {
        let options = PacketOptions {
            want_response: true,
            ..PacketOptions::to(Destination::Node(node))
        };
        self.send_packet(
            RouteDiscovery::default().encode_to_vec(),
            PortNum::TracerouteApp,
            options,
        )
        .await
    }

    /// Ask `node` for its current position.
    pub async fn request_position(&self, node: u32) -> Result<u32> {
        let options = PacketOptions {
            want_response: true,
            ..PacketOptions::to(Destination::Node(node))
        };
        self.send_packet(
            Position::default().encode_to_vec(),
            PortNum::PositionApp,
            options,
        )
        .await
    }

    // ========================================================================
    // Admin plumbing
    // ========================================================================

    async fn send_admin(
        &self,
        variant: Admin,
        target: Option<u32>,
        want_response: bool,
    ) -> Result<u32> {
        let options = PacketOptions {
            want_response,
            ..PacketOptions::to(target.map_or(Destination::Local, Destination::Node))
        };
        self.send_packet(
            AdminMessage::new(variant).encode_to_vec(),
            PortNum::AdminApp,
            options,
        )
        .await
    }

    fn set_pending_settings(&self, pending: bool) {
        self.inner.state.lock().session.pending_settings_changes = pending;
        self.publish(DeviceEvent::PendingSettingsChange(pending));
    }

    /// Open an edit session unless one is already open.
    async fn ensure_edit_session(&self) -> Result<()> {
        if !self.session_config().pending_settings_changes {
            self.begin_edit_settings().await?;
        }
        Ok(())
    }

    /// Start batching settings changes on the device.
    pub async fn begin_edit_settings(&self) -> Result<u32> {
        debug!("DeviceSession: opening settings edit session");
        self.set_pending_settings(true);
        self.send_admin(Admin::BeginEditSettings(true), None, false)
            .await
    }

    /// Apply the batched settings changes.
    pub async fn commit_edit_settings(&self) -> Result<u32> {
        debug!("DeviceSession: committing settings edit session");
        self.set_pending_settings(false);
        self.send_admin(Admin::CommitEditSettings(true), None, false)
            .await
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Write an encoded device config section.
    pub async fn set_config(&self, config: Vec<u8>) -> Result<u32> {
        self.ensure_edit_session().await?;
        self.send_admin(Admin::SetConfig(config), None, false).await
    }

    pub async fn get_config(&self, kind: ConfigType) -> Result<u32> {
        self.send_admin(Admin::GetConfigRequest(kind as i32), None, true)
            .await
    }

    /// Write an encoded module config section.
    pub async fn set_module_config(&self, config: Vec<u8>) -> Result<u32> {
        self.ensure_edit_session().await?;
        self.send_admin(Admin::SetModuleConfig(config), None, false)
            .await
    }

    pub async fn get_module_config(&self, kind: ModuleConfigType) -> Result<u32> {
        self.send_admin(Admin::GetModuleConfigRequest(kind as i32), None, true)
            .await
    }

    pub async fn set_owner(&self, owner: User) -> Result<u32> {
        self.send_admin(Admin::SetOwner(owner), None, false).await
    }

    pub async fn get_owner(&self) -> Result<u32> {
        self.send_admin(Admin::GetOwnerRequest(true), None, true)
            .await
    }

    pub async fn set_channel(&self, channel: Channel) -> Result<u32> {
        self.ensure_edit_session().await?;
        self.send_admin(Admin::SetChannel(channel), None, false)
            .await
    }

    /// Request the channel at `index`.
    pub async fn get_channel(&self, index: u32) -> Result<u32> {
        self.send_admin(Admin::GetChannelRequest(index + 1), None, true)
            .await
    }

    /// Disable the channel at `index` and wipe its settings.
    pub async fn clear_channel(&self, index: u32) -> Result<u32> {
        let channel = Channel {
            index: index as i32,
            settings: Some(ChannelSettings::default()),
            role: channel::Role::Disabled as i32,
        };
        self.set_channel(channel).await
    }

    /// Ask `node` (or our own node when `None`) for its device metadata.
    pub async fn get_metadata(&self, node: Option<u32>) -> Result<u32> {
        self.send_admin(Admin::GetDeviceMetadataRequest(true), node, true)
            .await
    }

    pub async fn get_canned_messages(&self) -> Result<u32> {
        self.send_admin(Admin::GetCannedMessageModuleMessagesRequest(true), None, true)
            .await
    }

    /// Replace the canned messages, `|`-separated.
    pub async fn set_canned_messages(&self, messages: &str) -> Result<u32> {
        self.send_admin(
            Admin::SetCannedMessageModuleMessages(messages.to_string()),
            None,
            false,
        )
        .await
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// Pin the node to a fixed position (degrees scaled by 1e7, meters).
    pub async fn set_fixed_position(
        &self,
        latitude_i: i32,
        longitude_i: i32,
        altitude: i32,
    ) -> Result<u32> {
        let position = Position {
            latitude_i: Some(latitude_i),
            longitude_i: Some(longitude_i),
            altitude: Some(altitude),
            ..Default::default()
        };
        self.send_admin(Admin::SetFixedPosition(position), None, false)
            .await
    }

    pub async fn remove_fixed_position(&self) -> Result<u32> {
        self.send_admin(Admin::RemoveFixedPosition(true), None, false)
            .await
    }

    // ========================================================================
    // Node database and lifecycle
    // ========================================================================

    pub async fn reset_nodes(&self) -> Result<u32> {
        self.send_admin(Admin::NodedbReset(1), None, false).await
    }

    pub async fn remove_node_by_num(&self, node: u32) -> Result<u32> {
        self.send_admin(Admin::RemoveByNodenum(node), None, false)
            .await
    }

    pub async fn enter_dfu_mode(&self) -> Result<u32> {
        self.send_admin(Admin::EnterDfuModeRequest(true), None, false)
            .await
    }

    /// Shut down after `seconds`.
    pub async fn shutdown(&self, seconds: i32) -> Result<u32> {
        self.send_admin(Admin::ShutdownSeconds(seconds), None, false)
            .await
    }

    /// Reboot after `seconds`; a negative value cancels a pending reboot.
    pub async fn reboot(&self, seconds: i32) -> Result<u32> {
        self.send_admin(Admin::RebootSeconds(seconds), None, false)
            .await
    }

    pub async fn reboot_ota(&self, seconds: i32) -> Result<u32> {
        self.send_admin(Admin::RebootOtaSeconds(seconds), None, false)
            .await
    }

    pub async fn factory_reset_device(&self) -> Result<u32> {
        self.send_admin(Admin::FactoryResetDevice(1), None, false)
            .await
    }

    pub async fn factory_reset_config(&self) -> Result<u32> {
        self.send_admin(Admin::FactoryResetConfig(1), None, false)
            .await
    }
}
