//! UI facade wire protocol (§6): the JSON message envelope exchanged with
//! WebSocket clients. Serializes/deserializes on the `type` tag, matching
//! the panel-link's own discriminated-union style.

use serde::{Deserialize, Serialize};

use itv2_engine::PartitionStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct ArmDisarmRequest {
    pub session_id: String,
    pub partition_number: u8,
    #[serde(default)]
    pub code: Option<String>,
}

/// Messages a UI client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    GetFullState,
    ArmAway(ArmDisarmRequest),
    ArmHome(ArmDisarmRequest),
    ArmNight(ArmDisarmRequest),
    Disarm(ArmDisarmRequest),
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionDto {
    pub partition_number: u8,
    pub name: Option<String>,
    pub status: PartitionStatusDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneDto {
    pub zone_number: u16,
    pub name: Option<String>,
    pub device_class: String,
    pub open: bool,
    pub partitions: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDto {
    pub session_id: String,
    pub name: Option<String>,
    pub partitions: Vec<PartitionDto>,
    pub zones: Vec<ZoneDto>,
}

/// Rendered lowercase_snake_case, matching [`PartitionStatus::as_str`].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatusDto {
    Unknown,
    Disarmed,
    ArmedAway,
    ArmedHome,
    ArmedNight,
    Arming,
    Pending,
    Triggered,
}

impl From<PartitionStatus> for PartitionStatusDto {
    fn from(status: PartitionStatus) -> Self {
        match status {
            PartitionStatus::Unknown => Self::Unknown,
            PartitionStatus::Disarmed => Self::Disarmed,
            PartitionStatus::ArmedAway => Self::ArmedAway,
            PartitionStatus::ArmedHome => Self::ArmedHome,
            PartitionStatus::ArmedNight => Self::ArmedNight,
            PartitionStatus::Arming => Self::Arming,
            PartitionStatus::Pending => Self::Pending,
            PartitionStatus::Triggered => Self::Triggered,
        }
    }
}

/// Messages the server pushes to UI clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    FullState {
        sessions: Vec<SessionDto>,
    },
    PartitionUpdate {
        session_id: String,
        partition_number: u8,
        status: PartitionStatusDto,
    },
    ZoneUpdate {
        session_id: String,
        zone_number: u16,
        open: bool,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_tags_are_snake_case() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"get_full_state"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetFullState));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"arm_away","session_id":"123456789012","partition_number":1,"code":"1234"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::ArmAway(req) => {
                assert_eq!(req.session_id, "123456789012");
                assert_eq!(req.partition_number, 1);
                assert_eq!(req.code.as_deref(), Some("1234"));
            }
            _ => panic!("expected ArmAway"),
        }
    }

    #[test]
    fn server_message_renders_snake_case_status() {
        let msg = ServerMessage::PartitionUpdate {
            session_id: "123456789012".to_owned(),
            partition_number: 1,
            status: PartitionStatus::ArmedAway.into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"partition_update\""));
        assert!(json.contains("\"status\":\"armed_away\""));
    }
}
