//! Typed message records (component C3/C4).
//!
//! Every record type implements [`WireMessage`] and declares its command
//! code, app-sequence flag, and transaction pattern as associated
//! constants. [`MessageRecord`] is the tagged union the rest of the engine
//! matches on; unknown commands decode to [`DefaultMessage`] (invariant I5:
//! it never consumes more or fewer bytes than its payload).

use chrono::NaiveDateTime;

use crate::codec::{pack_bits, unpack_bits, Reader, Writer};
use crate::command::{commands, CommandCode};
use crate::error::WireError;

/// The three transaction state machines a record's command can be
/// classified under (component C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPattern {
    SimpleAck,
    CommandResponse,
    CommandRequest,
}

/// A type that can be read from and written to a record payload in
/// declaration-order field-list fashion.
pub trait WireMessage: Sized {
    const COMMAND: CommandCode;
    const APP_SEQUENCE: bool;
    const PATTERN: TransactionPattern;

    fn read(r: &mut Reader) -> Result<Self, WireError>;
    fn write(&self, w: &mut Writer);
}

// ---------------------------------------------------------------------------
// Handshake records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionTypeWire {
    Type1 = 1,
    Type2 = 2,
}

impl EncryptionTypeWire {
    fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            1 => Ok(Self::Type1),
            2 => Ok(Self::Type2),
            other => Err(WireError::Codec(format!(
                "unrecognised EncryptionType {}",
                other
            ))),
        }
    }
}

/// Sent (and echoed) as the first packet of a session. The peer's header
/// bytes, not this record, carry the integration identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub rx_buffer_size: u16,
    pub encryption_type: EncryptionTypeWire,
}

impl WireMessage for OpenSession {
    const COMMAND: CommandCode = commands::OPEN_SESSION;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let rx_buffer_size = r.u16()?;
        let encryption_type = EncryptionTypeWire::from_u8(r.u8()?)?;
        Ok(Self {
            rx_buffer_size,
            encryption_type,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u16(self.rx_buffer_size);
        w.u8(self.encryption_type as u8);
    }
}

/// Carries the AES key-exchange initializer: 48 bytes for Type 1, 16 bytes
/// for Type 2. The field is declared unbounded so both lengths round-trip
/// without a separate record per encryption type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAccess {
    pub initializer: Vec<u8>,
}

impl WireMessage for RequestAccess {
    const COMMAND: CommandCode = commands::REQUEST_ACCESS;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self {
            initializer: r.bytes_remaining(),
        })
    }

    fn write(&self, w: &mut Writer) {
        w.bytes_unbounded(&self.initializer);
    }
}

// ---------------------------------------------------------------------------
// Transaction plumbing records
// ---------------------------------------------------------------------------

/// Acknowledges receipt of a prior message; carries no payload of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimpleAck;

impl WireMessage for SimpleAck {
    const COMMAND: CommandCode = commands::SIMPLE_ACK;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(_r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self)
    }

    fn write(&self, _w: &mut Writer) {}
}

/// Negative acknowledgement carrying a panel-defined nack classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandError {
    pub nack_code: u8,
}

impl WireMessage for CommandError {
    const COMMAND: CommandCode = commands::COMMAND_ERROR;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self {
            nack_code: r.u8()?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.nack_code);
    }
}

/// Explicit response to a command, preceding the final `SimpleAck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResponse {
    pub status_code: u8,
}

impl CommandResponse {
    pub const SUCCESS: u8 = 0x00;

    pub fn is_success(&self) -> bool {
        self.status_code == Self::SUCCESS
    }
}

impl WireMessage for CommandResponse {
    const COMMAND: CommandCode = commands::COMMAND_RESPONSE;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self {
            status_code: r.u8()?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.status_code);
    }
}

/// Initiates a `CommandRequest`-pattern transaction: ask the panel to run
/// `requested_command` and wait for any reply carrying that command code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequestMessage {
    pub requested_command: CommandCode,
    pub data: Vec<u8>,
}

impl WireMessage for CommandRequestMessage {
    const COMMAND: CommandCode = commands::COMMAND_REQUEST;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::CommandRequest;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let requested_command = r.u16()?;
        let data = r.bytes_remaining();
        Ok(Self {
            requested_command,
            data,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u16(self.requested_command);
        w.bytes_unbounded(&self.data);
    }
}

/// Heartbeat sent every 100 seconds to defeat the panel's idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionPoll;

impl WireMessage for ConnectionPoll {
    const COMMAND: CommandCode = commands::CONNECTION_POLL;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(_r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self)
    }

    fn write(&self, _w: &mut Writer) {}
}

// ---------------------------------------------------------------------------
// Arm/disarm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmMode {
    Disarm = 0,
    AwayArm = 1,
    StayArm = 2,
    NightArm = 3,
    ArmWithNoEntryDelay = 4,
    /// A code the panel sent that isn't one of the modes above; preserved
    /// verbatim rather than rejected, per the handler's "unknown -> ArmedAway"
    /// fallback.
    Other(u8),
}

impl ArmMode {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Disarm,
            1 => Self::AwayArm,
            2 => Self::StayArm,
            3 => Self::NightArm,
            4 => Self::ArmWithNoEntryDelay,
            other => Self::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Disarm => 0,
            Self::AwayArm => 1,
            Self::StayArm => 2,
            Self::NightArm => 3,
            Self::ArmWithNoEntryDelay => 4,
            Self::Other(v) => v,
        }
    }
}

/// Outbound command to arm or disarm a partition.
///
/// `access_code` defaults to empty in Quick-Arm flows; see open question in
/// DESIGN.md about whether the panel accepts that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionArmCommand {
    pub partition: u8,
    pub arm_mode: ArmMode,
    pub access_code: String,
}

impl WireMessage for PartitionArmCommand {
    const COMMAND: CommandCode = commands::PARTITION_ARM_COMMAND;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::CommandResponse;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let partition = r.u8()?;
        let arm_mode = ArmMode::from_u8(r.u8()?);
        let access_code = r.bcd_prefixed()?;
        Ok(Self {
            partition,
            arm_mode,
            access_code,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.partition);
        w.u8(self.arm_mode.to_u8());
        w.bcd_prefixed(&self.access_code);
    }
}

/// Inbound broadcast reporting a partition's arm state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationArmDisarm {
    pub partition: u8,
    pub arm_mode: ArmMode,
}

impl WireMessage for NotificationArmDisarm {
    const COMMAND: CommandCode = commands::NOTIFICATION_ARM_DISARM;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let partition = r.u8()?;
        let arm_mode = ArmMode::from_u8(r.u8()?);
        Ok(Self {
            partition,
            arm_mode,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.partition);
        w.u8(self.arm_mode.to_u8());
    }
}

// ---------------------------------------------------------------------------
// Partition ready status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyStatus {
    NotReady = 0,
    ReadyToArm = 1,
    ReadyToForceArm = 2,
}

impl ReadyStatus {
    fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(Self::NotReady),
            1 => Ok(Self::ReadyToArm),
            2 => Ok(Self::ReadyToForceArm),
            other => Err(WireError::Codec(format!(
                "unrecognised partition ready status {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPartitionReadyStatus {
    pub partition: u8,
    pub status: ReadyStatus,
}

impl WireMessage for NotificationPartitionReadyStatus {
    const COMMAND: CommandCode = commands::NOTIFICATION_PARTITION_READY_STATUS;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let partition = r.u8()?;
        let status = ReadyStatus::from_u8(r.u8()?)?;
        Ok(Self { partition, status })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.partition);
        w.u8(self.status as u8);
    }
}

// ---------------------------------------------------------------------------
// Exit delay
// ---------------------------------------------------------------------------

/// Bit positions within the 1-byte `DelayFlags` group.
mod delay_flags {
    pub const AUDIBLE: u32 = 0;
    pub const RESTARTED: u32 = 1;
    pub const URGENT: u32 = 2;
    pub const ACTIVE: u32 = 7;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationExitDelay {
    pub partition: u8,
    pub active: bool,
    pub duration_seconds: u16,
    pub audible: bool,
    pub urgent: bool,
    pub restarted: bool,
}

impl WireMessage for NotificationExitDelay {
    const COMMAND: CommandCode = commands::NOTIFICATION_EXIT_DELAY;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let partition = r.u8()?;
        let flags = r.u8()? as u32;
        let duration_seconds = r.u16()?;
        Ok(Self {
            partition,
            active: unpack_bits(flags, delay_flags::ACTIVE, 1) != 0,
            audible: unpack_bits(flags, delay_flags::AUDIBLE, 1) != 0,
            urgent: unpack_bits(flags, delay_flags::URGENT, 1) != 0,
            restarted: unpack_bits(flags, delay_flags::RESTARTED, 1) != 0,
            duration_seconds,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.partition);
        let mut flags = 0u32;
        flags |= pack_bits(delay_flags::AUDIBLE, 1, self.audible as u32);
        flags |= pack_bits(delay_flags::RESTARTED, 1, self.restarted as u32);
        flags |= pack_bits(delay_flags::URGENT, 1, self.urgent as u32);
        flags |= pack_bits(delay_flags::ACTIVE, 1, self.active as u32);
        w.u8(flags as u8);
        w.u16(self.duration_seconds);
    }
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStatus {
    Closed = 0,
    Open = 1,
}

impl ZoneStatus {
    fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(Self::Closed),
            1 => Ok(Self::Open),
            other => Err(WireError::Codec(format!(
                "unrecognised zone status {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationLifestyleZoneStatus {
    pub zone: u16,
    pub status: ZoneStatus,
}

impl WireMessage for NotificationLifestyleZoneStatus {
    const COMMAND: CommandCode = commands::NOTIFICATION_LIFESTYLE_ZONE_STATUS;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let zone = r.u16()?;
        let status = ZoneStatus::from_u8(r.u8()?)?;
        Ok(Self { zone, status })
    }

    fn write(&self, w: &mut Writer) {
        w.u16(self.zone);
        w.u8(self.status as u8);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationZoneAlarm {
    pub zone: u16,
    pub in_alarm: bool,
}

impl WireMessage for NotificationZoneAlarm {
    const COMMAND: CommandCode = commands::NOTIFICATION_ZONE_ALARM;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let zone = r.u16()?;
        let in_alarm = r.u8()? != 0;
        Ok(Self { zone, in_alarm })
    }

    fn write(&self, w: &mut Writer) {
        w.u16(self.zone);
        w.u8(self.in_alarm as u8);
    }
}

/// Panel-level trouble condition (AC loss, low battery, etc.); the specific
/// trouble classifier is carried as a compact integer since the panel's
/// trouble code space is sparse and open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationTroubleStatus {
    pub trouble_code: i32,
    pub active: bool,
}

impl WireMessage for NotificationTroubleStatus {
    const COMMAND: CommandCode = commands::NOTIFICATION_TROUBLE_STATUS;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let trouble_code = r.compact_i32()?;
        let active = r.u8()? != 0;
        Ok(Self {
            trouble_code,
            active,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.compact_i32(self.trouble_code);
        w.u8(self.active as u8);
    }
}

// ---------------------------------------------------------------------------
// Date/time broadcast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDateTimeBroadcast {
    pub panel_date_time: NaiveDateTime,
}

impl WireMessage for NotificationDateTimeBroadcast {
    const COMMAND: CommandCode = commands::NOTIFICATION_DATE_TIME_BROADCAST;
    const APP_SEQUENCE: bool = true;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self {
            panel_date_time: r.packed_datetime()?,
        })
    }

    fn write(&self, w: &mut Writer) {
        // Out-of-range years are programmer error at this layer; the engine
        // validates before constructing the record.
        w.packed_datetime(&self.panel_date_time)
            .expect("panel_date_time must be within 2000-2063");
    }
}

// ---------------------------------------------------------------------------
// Unknown / container records
// ---------------------------------------------------------------------------

/// Fallback for any command code not in the registry. Invariant I5: the raw
/// bytes are exactly the record's payload, no more, no less.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultMessage {
    pub command: CommandCode,
    pub raw_bytes: Vec<u8>,
}

/// One sub-message inside a `MultipleMessagePacket`: its own command header
/// plus codec bytes, never an app-sequence byte even if the command is
/// normally app-sequenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMessage {
    pub command: CommandCode,
    pub payload: Vec<u8>,
}

/// A concatenation of `<1-byte length><command(2)><payload>` sub-messages,
/// consuming to the end of the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleMessagePacket {
    pub messages: Vec<SubMessage>,
}

impl WireMessage for MultipleMessagePacket {
    const COMMAND: CommandCode = commands::MULTIPLE_MESSAGE;
    const APP_SEQUENCE: bool = false;
    const PATTERN: TransactionPattern = TransactionPattern::SimpleAck;

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let mut messages = Vec::new();
        while r.remaining() > 0 {
            let len = r.u8()? as usize;
            if len < 2 {
                return Err(WireError::Codec(
                    "multiple-message sub-entry shorter than a command header".to_owned(),
                ));
            }
            let entry = r.bytes_fixed(len)?;
            let command = u16::from_be_bytes([entry[0], entry[1]]);
            messages.push(SubMessage {
                command,
                payload: entry[2..].to_vec(),
            });
        }
        Ok(Self { messages })
    }

    fn write(&self, w: &mut Writer) {
        for m in &self.messages {
            let mut entry = Vec::with_capacity(2 + m.payload.len());
            entry.extend_from_slice(&m.command.to_be_bytes());
            entry.extend_from_slice(&m.payload);
            w.u8(entry.len() as u8);
            w.bytes_unbounded(&entry);
        }
    }
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// Every decoded record type the engine knows how to act on, plus the
/// fallback for anything outside the registered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRecord {
    OpenSession(OpenSession),
    RequestAccess(RequestAccess),
    SimpleAck(SimpleAck),
    CommandError(CommandError),
    CommandResponse(CommandResponse),
    CommandRequest(CommandRequestMessage),
    ConnectionPoll(ConnectionPoll),
    PartitionArmCommand(PartitionArmCommand),
    NotificationArmDisarm(NotificationArmDisarm),
    NotificationPartitionReadyStatus(NotificationPartitionReadyStatus),
    NotificationExitDelay(NotificationExitDelay),
    NotificationLifestyleZoneStatus(NotificationLifestyleZoneStatus),
    NotificationZoneAlarm(NotificationZoneAlarm),
    NotificationTroubleStatus(NotificationTroubleStatus),
    NotificationDateTimeBroadcast(NotificationDateTimeBroadcast),
    MultipleMessagePacket(MultipleMessagePacket),
    Default(DefaultMessage),
}

impl MessageRecord {
    /// The command code this record was decoded from (or will be sent
    /// under), regardless of variant.
    pub fn command(&self) -> CommandCode {
        match self {
            Self::OpenSession(_) => OpenSession::COMMAND,
            Self::RequestAccess(_) => RequestAccess::COMMAND,
            Self::SimpleAck(_) => SimpleAck::COMMAND,
            Self::CommandError(_) => CommandError::COMMAND,
            Self::CommandResponse(_) => CommandResponse::COMMAND,
            Self::CommandRequest(_) => CommandRequestMessage::COMMAND,
            Self::ConnectionPoll(_) => ConnectionPoll::COMMAND,
            Self::PartitionArmCommand(_) => PartitionArmCommand::COMMAND,
            Self::NotificationArmDisarm(_) => NotificationArmDisarm::COMMAND,
            Self::NotificationPartitionReadyStatus(_) => {
                NotificationPartitionReadyStatus::COMMAND
            }
            Self::NotificationExitDelay(_) => NotificationExitDelay::COMMAND,
            Self::NotificationLifestyleZoneStatus(_) => {
                NotificationLifestyleZoneStatus::COMMAND
            }
            Self::NotificationZoneAlarm(_) => NotificationZoneAlarm::COMMAND,
            Self::NotificationTroubleStatus(_) => NotificationTroubleStatus::COMMAND,
            Self::NotificationDateTimeBroadcast(_) => NotificationDateTimeBroadcast::COMMAND,
            Self::MultipleMessagePacket(_) => MultipleMessagePacket::COMMAND,
            Self::Default(m) => m.command,
        }
    }

    /// Whether an outbound app-sequence byte should be emitted for this
    /// record, per its declaring type. `MultipleMessagePacket` sub-messages
    /// never carry one regardless of the sub-message's own command.
    pub fn app_sequence(&self) -> bool {
        match self {
            Self::OpenSession(_) => OpenSession::APP_SEQUENCE,
            Self::RequestAccess(_) => RequestAccess::APP_SEQUENCE,
            Self::SimpleAck(_) => SimpleAck::APP_SEQUENCE,
            Self::CommandError(_) => CommandError::APP_SEQUENCE,
            Self::CommandResponse(_) => CommandResponse::APP_SEQUENCE,
            Self::CommandRequest(_) => CommandRequestMessage::APP_SEQUENCE,
            Self::ConnectionPoll(_) => ConnectionPoll::APP_SEQUENCE,
            Self::PartitionArmCommand(_) => PartitionArmCommand::APP_SEQUENCE,
            Self::NotificationArmDisarm(_) => NotificationArmDisarm::APP_SEQUENCE,
            Self::NotificationPartitionReadyStatus(_) => {
                NotificationPartitionReadyStatus::APP_SEQUENCE
            }
            Self::NotificationExitDelay(_) => NotificationExitDelay::APP_SEQUENCE,
            Self::NotificationLifestyleZoneStatus(_) => {
                NotificationLifestyleZoneStatus::APP_SEQUENCE
            }
            Self::NotificationZoneAlarm(_) => NotificationZoneAlarm::APP_SEQUENCE,
            Self::NotificationTroubleStatus(_) => NotificationTroubleStatus::APP_SEQUENCE,
            Self::NotificationDateTimeBroadcast(_) => {
                NotificationDateTimeBroadcast::APP_SEQUENCE
            }
            Self::MultipleMessagePacket(_) => MultipleMessagePacket::APP_SEQUENCE,
            Self::Default(_) => false,
        }
    }

    pub fn pattern(&self) -> TransactionPattern {
        match self {
            Self::OpenSession(_) => OpenSession::PATTERN,
            Self::RequestAccess(_) => RequestAccess::PATTERN,
            Self::SimpleAck(_) => SimpleAck::PATTERN,
            Self::CommandError(_) => CommandError::PATTERN,
            Self::CommandResponse(_) => CommandResponse::PATTERN,
            Self::CommandRequest(_) => CommandRequestMessage::PATTERN,
            Self::ConnectionPoll(_) => ConnectionPoll::PATTERN,
            Self::PartitionArmCommand(_) => PartitionArmCommand::PATTERN,
            Self::NotificationArmDisarm(_) => NotificationArmDisarm::PATTERN,
            Self::NotificationPartitionReadyStatus(_) => {
                NotificationPartitionReadyStatus::PATTERN
            }
            Self::NotificationExitDelay(_) => NotificationExitDelay::PATTERN,
            Self::NotificationLifestyleZoneStatus(_) => NotificationLifestyleZoneStatus::PATTERN,
            Self::NotificationZoneAlarm(_) => NotificationZoneAlarm::PATTERN,
            Self::NotificationTroubleStatus(_) => NotificationTroubleStatus::PATTERN,
            Self::NotificationDateTimeBroadcast(_) => NotificationDateTimeBroadcast::PATTERN,
            Self::MultipleMessagePacket(_) => MultipleMessagePacket::PATTERN,
            Self::Default(_) => TransactionPattern::SimpleAck,
        }
    }

    /// Encode this record's payload bytes (not including the command header
    /// or app-sequence byte, which the packet envelope owns).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Self::OpenSession(m) => m.write(&mut w),
            Self::RequestAccess(m) => m.write(&mut w),
            Self::SimpleAck(m) => m.write(&mut w),
            Self::CommandError(m) => m.write(&mut w),
            Self::CommandResponse(m) => m.write(&mut w),
            Self::CommandRequest(m) => m.write(&mut w),
            Self::ConnectionPoll(m) => m.write(&mut w),
            Self::PartitionArmCommand(m) => m.write(&mut w),
            Self::NotificationArmDisarm(m) => m.write(&mut w),
            Self::NotificationPartitionReadyStatus(m) => m.write(&mut w),
            Self::NotificationExitDelay(m) => m.write(&mut w),
            Self::NotificationLifestyleZoneStatus(m) => m.write(&mut w),
            Self::NotificationZoneAlarm(m) => m.write(&mut w),
            Self::NotificationTroubleStatus(m) => m.write(&mut w),
            Self::NotificationDateTimeBroadcast(m) => m.write(&mut w),
            Self::MultipleMessagePacket(m) => m.write(&mut w),
            Self::Default(m) => w.bytes_unbounded(&m.raw_bytes),
        }
        w.into_bytes()
    }

    /// Decode `payload` for the given `command`, dispatching on the
    /// registered command codes. Anything unrecognised becomes
    /// [`DefaultMessage`].
    pub fn decode_payload(command: CommandCode, payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = match command {
            c if c == OpenSession::COMMAND => Self::OpenSession(OpenSession::read(&mut r)?),
            c if c == RequestAccess::COMMAND => Self::RequestAccess(RequestAccess::read(&mut r)?),
            c if c == SimpleAck::COMMAND => Self::SimpleAck(SimpleAck::read(&mut r)?),
            c if c == CommandError::COMMAND => Self::CommandError(CommandError::read(&mut r)?),
            c if c == CommandResponse::COMMAND => {
                Self::CommandResponse(CommandResponse::read(&mut r)?)
            }
            c if c == CommandRequestMessage::COMMAND => {
                Self::CommandRequest(CommandRequestMessage::read(&mut r)?)
            }
            c if c == ConnectionPoll::COMMAND => Self::ConnectionPoll(ConnectionPoll::read(&mut r)?),
            c if c == PartitionArmCommand::COMMAND => {
                Self::PartitionArmCommand(PartitionArmCommand::read(&mut r)?)
            }
            c if c == NotificationArmDisarm::COMMAND => {
                Self::NotificationArmDisarm(NotificationArmDisarm::read(&mut r)?)
            }
            c if c == NotificationPartitionReadyStatus::COMMAND => {
                Self::NotificationPartitionReadyStatus(NotificationPartitionReadyStatus::read(
                    &mut r,
                )?)
            }
            c if c == NotificationExitDelay::COMMAND => {
                Self::NotificationExitDelay(NotificationExitDelay::read(&mut r)?)
            }
            c if c == NotificationLifestyleZoneStatus::COMMAND => {
                Self::NotificationLifestyleZoneStatus(NotificationLifestyleZoneStatus::read(
                    &mut r,
                )?)
            }
            c if c == NotificationZoneAlarm::COMMAND => {
                Self::NotificationZoneAlarm(NotificationZoneAlarm::read(&mut r)?)
            }
            c if c == NotificationTroubleStatus::COMMAND => {
                Self::NotificationTroubleStatus(NotificationTroubleStatus::read(&mut r)?)
            }
            c if c == NotificationDateTimeBroadcast::COMMAND => {
                Self::NotificationDateTimeBroadcast(NotificationDateTimeBroadcast::read(&mut r)?)
            }
            c if c == MultipleMessagePacket::COMMAND => {
                Self::MultipleMessagePacket(MultipleMessagePacket::read(&mut r)?)
            }
            other => Self::Default(DefaultMessage {
                command: other,
                raw_bytes: r.bytes_remaining(),
            }),
        };
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<M: WireMessage + std::fmt::Debug + PartialEq>(m: &M) {
        let mut w = Writer::new();
        m.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = M::read(&mut r).unwrap();
        assert_eq!(&decoded, m);
    }

    #[test]
    fn open_session_round_trips() {
        round_trip(&OpenSession {
            rx_buffer_size: 512,
            encryption_type: EncryptionTypeWire::Type2,
        });
    }

    #[test]
    fn request_access_round_trips_both_lengths() {
        round_trip(&RequestAccess {
            initializer: vec![0u8; 48],
        });
        round_trip(&RequestAccess {
            initializer: vec![1u8; 16],
        });
    }

    #[test]
    fn simple_ack_is_empty() {
        let mut w = Writer::new();
        SimpleAck.write(&mut w);
        assert!(w.into_bytes().is_empty());
    }

    #[test]
    fn partition_arm_command_round_trips() {
        round_trip(&PartitionArmCommand {
            partition: 1,
            arm_mode: ArmMode::AwayArm,
            access_code: "1234".to_owned(),
        });
        round_trip(&PartitionArmCommand {
            partition: 1,
            arm_mode: ArmMode::Disarm,
            access_code: String::new(),
        });
    }

    #[test]
    fn exit_delay_flags_round_trip() {
        round_trip(&NotificationExitDelay {
            partition: 1,
            active: true,
            duration_seconds: 60,
            audible: true,
            urgent: false,
            restarted: false,
        });
    }

    #[test]
    fn date_time_broadcast_round_trips() {
        let dt = chrono::NaiveDate::from_ymd_opt(2026, 7, 30)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        round_trip(&NotificationDateTimeBroadcast {
            panel_date_time: dt,
        });
    }

    #[test]
    fn multiple_message_packet_round_trips() {
        let packet = MultipleMessagePacket {
            messages: vec![
                SubMessage {
                    command: commands::NOTIFICATION_ARM_DISARM,
                    payload: vec![1, 1],
                },
                SubMessage {
                    command: commands::NOTIFICATION_PARTITION_READY_STATUS,
                    payload: vec![1, 0],
                },
            ],
        };
        round_trip(&packet);
    }

    #[test]
    fn default_message_consumes_exact_payload() {
        let raw = vec![1, 2, 3, 4, 5];
        let msg = DefaultMessage {
            command: 0xBEEF,
            raw_bytes: raw.clone(),
        };
        assert_eq!(msg.raw_bytes.len(), raw.len());
    }

    #[test]
    fn message_record_dispatches_known_command() {
        let record = MessageRecord::PartitionArmCommand(PartitionArmCommand {
            partition: 2,
            arm_mode: ArmMode::StayArm,
            access_code: "4321".to_owned(),
        });
        let payload = record.encode_payload();
        let decoded =
            MessageRecord::decode_payload(commands::PARTITION_ARM_COMMAND, &payload).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.pattern(), TransactionPattern::CommandResponse);
        assert!(!decoded.app_sequence());
    }

    #[test]
    fn message_record_falls_back_to_default_for_unknown_command() {
        let payload = vec![9, 9, 9];
        let decoded = MessageRecord::decode_payload(0xFFFE, &payload).unwrap();
        match decoded {
            MessageRecord::Default(m) => {
                assert_eq!(m.command, 0xFFFE);
                assert_eq!(m.raw_bytes, payload);
            }
            other => panic!("expected Default, got {:?}", other),
        }
    }
}
