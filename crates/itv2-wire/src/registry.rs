//! Command metadata registry (component C4).
//!
//! Replaces the reflection-driven attribute scan of the original design
//! with a static table assembled once at startup. [`Registry::build`] is
//! the single place new record types must be listed; a duplicate command
//! code is a startup-fatal error rather than a silent override.

use std::collections::HashMap;

use crate::command::{commands, CommandCode};
use crate::error::WireError;
use crate::messages::TransactionPattern;

/// Static facts about one registered record type, independent of any
/// particular instance.
#[derive(Debug, Clone, Copy)]
pub struct RecordMeta {
    pub command: CommandCode,
    pub name: &'static str,
    pub app_sequence: bool,
    pub pattern: TransactionPattern,
    /// Whether this record is part of the application-facing surface (arm
    /// commands, panel notifications) as opposed to protocol-internal
    /// plumbing (handshake, ack/response, heartbeat) that the dispatcher
    /// never forwards to application state.
    pub is_public: bool,
}

/// The full set of known command codes, keyed for lookup in either
/// direction the engine needs: by wire command code (decoding) and by name
/// (diagnostics, config).
#[derive(Debug)]
pub struct Registry {
    by_command: HashMap<CommandCode, RecordMeta>,
}

impl Registry {
    /// Build the registry, failing if two entries claim the same command
    /// code.
    pub fn build() -> Result<Self, WireError> {
        let entries = [
            RecordMeta {
                command: commands::OPEN_SESSION,
                name: "OpenSession",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::REQUEST_ACCESS,
                name: "RequestAccess",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::SIMPLE_ACK,
                name: "SimpleAck",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::COMMAND_ERROR,
                name: "CommandError",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::COMMAND_RESPONSE,
                name: "CommandResponse",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::COMMAND_REQUEST,
                name: "CommandRequest",
                app_sequence: false,
                pattern: TransactionPattern::CommandRequest,
                is_public: false,
            },
            RecordMeta {
                command: commands::CONNECTION_POLL,
                name: "ConnectionPoll",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::MULTIPLE_MESSAGE,
                name: "MultipleMessagePacket",
                app_sequence: false,
                pattern: TransactionPattern::SimpleAck,
                is_public: false,
            },
            RecordMeta {
                command: commands::PARTITION_ARM_COMMAND,
                name: "PartitionArmCommand",
                app_sequence: false,
                pattern: TransactionPattern::CommandResponse,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_ARM_DISARM,
                name: "NotificationArmDisarm",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_PARTITION_READY_STATUS,
                name: "NotificationPartitionReadyStatus",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_EXIT_DELAY,
                name: "NotificationExitDelay",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_LIFESTYLE_ZONE_STATUS,
                name: "NotificationLifestyleZoneStatus",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_ZONE_ALARM,
                name: "NotificationZoneAlarm",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_TROUBLE_STATUS,
                name: "NotificationTroubleStatus",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
            RecordMeta {
                command: commands::NOTIFICATION_DATE_TIME_BROADCAST,
                name: "NotificationDateTimeBroadcast",
                app_sequence: true,
                pattern: TransactionPattern::SimpleAck,
                is_public: true,
            },
        ];

        let mut by_command = HashMap::with_capacity(entries.len());
        for entry in entries {
            if by_command.insert(entry.command, entry).is_some() {
                return Err(WireError::DuplicateCommand(entry.command));
            }
        }
        Ok(Self { by_command })
    }

    pub fn lookup(&self, command: CommandCode) -> Option<&RecordMeta> {
        self.by_command.get(&command)
    }

    pub fn is_known(&self, command: CommandCode) -> bool {
        self.by_command.contains_key(&command)
    }
}
