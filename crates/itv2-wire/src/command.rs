//! 16-bit command codes (component C4).
//!
//! These are a representative subset of the panel's real command set; the
//! registry and codec generalize to the full ~60-command catalogue, but
//! only the codes actually exercised by the engine are assigned here.
//! Unknown inbound codes always decode to [`crate::messages::DefaultMessage`].

pub type CommandCode = u16;

pub mod commands {
    use super::CommandCode;

    pub const OPEN_SESSION: CommandCode = 0x0001;
    pub const REQUEST_ACCESS: CommandCode = 0x0002;
    pub const SIMPLE_ACK: CommandCode = 0x0003;
    pub const COMMAND_ERROR: CommandCode = 0x0004;
    pub const COMMAND_RESPONSE: CommandCode = 0x0005;
    pub const COMMAND_REQUEST: CommandCode = 0x0006;
    pub const CONNECTION_POLL: CommandCode = 0x0007;
    pub const MULTIPLE_MESSAGE: CommandCode = 0x0008;

    pub const PARTITION_ARM_COMMAND: CommandCode = 0x0100;

    pub const NOTIFICATION_ARM_DISARM: CommandCode = 0x0200;
    pub const NOTIFICATION_PARTITION_READY_STATUS: CommandCode = 0x0201;
    pub const NOTIFICATION_EXIT_DELAY: CommandCode = 0x0202;
    pub const NOTIFICATION_LIFESTYLE_ZONE_STATUS: CommandCode = 0x0203;
    pub const NOTIFICATION_ZONE_ALARM: CommandCode = 0x0204;
    pub const NOTIFICATION_TROUBLE_STATUS: CommandCode = 0x0205;
    pub const NOTIFICATION_DATE_TIME_BROADCAST: CommandCode = 0x0206;
}
