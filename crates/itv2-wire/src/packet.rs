//! Logical packet envelope: command header, optional app-sequence byte, and
//! the record payload (components C3/C4 tied together).
//!
//! A [`MessagePacket`] is the unit the transaction layer operates on. It sits
//! between the codec (which only knows about one record's fields) and the
//! session layer (which owns framing and encryption). Wire layout:
//!
//! ```text
//! command_hi command_lo [app_seq] <record payload>
//! ```
//!
//! `app_seq` is present iff the resolved record type declares
//! `APP_SEQUENCE = true` *and* the packet is not a `MultipleMessagePacket`
//! sub-message (those never carry one, regardless of their own command).

use crate::command::CommandCode;
use crate::error::WireError;
use crate::messages::MessageRecord;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePacket {
    pub app_seq: Option<u8>,
    pub message: MessageRecord,
}

impl MessagePacket {
    pub fn command(&self) -> CommandCode {
        self.message.command()
    }

    /// Serialize to the logical (unencrypted, unframed) byte sequence ready
    /// to hand to the encryption layer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.command().to_be_bytes());
        if let Some(seq) = self.app_seq {
            out.push(seq);
        }
        out.extend_from_slice(&self.message.encode_payload());
        out
    }

    /// Parse a logical payload into a packet, using `registry` to decide
    /// whether an app-sequence byte is present for the resolved command.
    /// Unregistered commands are treated as having no app-sequence byte,
    /// matching `DefaultMessage`'s declared behaviour.
    pub fn deserialize(registry: &Registry, bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < 2 {
            return Err(WireError::Codec(
                "packet shorter than a 2-byte command header".to_owned(),
            ));
        }
        let command = u16::from_be_bytes([bytes[0], bytes[1]]);
        let has_app_seq = registry
            .lookup(command)
            .map(|meta| meta.app_sequence)
            .unwrap_or(false);

        let mut pos = 2;
        let app_seq = if has_app_seq {
            let seq = *bytes
                .get(pos)
                .ok_or_else(|| WireError::Codec("missing app-sequence byte".to_owned()))?;
            pos += 1;
            Some(seq)
        } else {
            None
        };

        let message = MessageRecord::decode_payload(command, &bytes[pos..])?;
        Ok(Self { app_seq, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ArmMode, NotificationArmDisarm, PartitionArmCommand};

    #[test]
    fn app_seq_present_for_notifications_absent_for_commands() {
        let registry = Registry::build().unwrap();

        let notif = MessagePacket {
            app_seq: Some(5),
            message: MessageRecord::NotificationArmDisarm(NotificationArmDisarm {
                partition: 1,
                arm_mode: ArmMode::AwayArm,
            }),
        };
        let bytes = notif.serialize();
        let decoded = MessagePacket::deserialize(&registry, &bytes).unwrap();
        assert_eq!(decoded, notif);

        let cmd = MessagePacket {
            app_seq: None,
            message: MessageRecord::PartitionArmCommand(PartitionArmCommand {
                partition: 1,
                arm_mode: ArmMode::Disarm,
                access_code: "1234".to_owned(),
            }),
        };
        let bytes = cmd.serialize();
        let decoded = MessagePacket::deserialize(&registry, &bytes).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn unknown_command_has_no_app_seq_slot() {
        let registry = Registry::build().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend_from_slice(&[1, 2, 3]);
        let decoded = MessagePacket::deserialize(&registry, &bytes).unwrap();
        assert_eq!(decoded.app_seq, None);
        match decoded.message {
            MessageRecord::Default(m) => assert_eq!(m.raw_bytes, vec![1, 2, 3]),
            other => panic!("expected Default, got {:?}", other),
        }
    }

    #[test]
    fn truncated_header_is_rejected() {
        let registry = Registry::build().unwrap();
        let err = MessagePacket::deserialize(&registry, &[0x01]).unwrap_err();
        assert!(matches!(err, WireError::Codec(_)));
    }
}
