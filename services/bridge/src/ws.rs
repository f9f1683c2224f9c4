//! UI-facing WebSocket endpoint (§6): clients request state and issue arm
//! commands; the server pushes state-change notifications to every
//! connected client as they happen.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{info, warn};

use itv2_engine::PanelStateChange;
use itv2_wire::messages::{ArmMode, MessageRecord, PartitionArmCommand};

use crate::protocol::{ArmDisarmRequest, ClientMessage, PartitionDto, ServerMessage, SessionDto, ZoneDto};
use crate::state::AppState;

const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn ws_ui_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ui_socket(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to encode server message");
            false
        }
    }
}

async fn handle_ui_socket(mut socket: WebSocket, state: AppState) {
    let mut panel_events = state.panel_state.subscribe();

    loop {
        tokio::select! {
            msg = tokio::time::timeout(CLIENT_IDLE_TIMEOUT, socket.recv()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if !handle_client_message(&mut socket, &state, client_msg).await {
                                    break;
                                }
                            }
                            Err(e) => {
                                let err = ServerMessage::Error { message: format!("invalid message: {e}") };
                                if !send(&mut socket, &err).await {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        info!("UI client disconnected");
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "UI WebSocket error");
                        break;
                    }
                    Ok(Some(Ok(_))) => {}
                    Err(_) => {
                        warn!("UI client idle timeout");
                        break;
                    }
                }
            }
            event = panel_events.recv() => {
                match event {
                    Ok(change) => {
                        if let Some(update) = render_change(change) {
                            if !send(&mut socket, &update).await {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "UI client lagged behind panel-state broadcast");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

fn render_change(change: PanelStateChange) -> Option<ServerMessage> {
    match change {
        PanelStateChange::PartitionStateChanged { session_id, partition } => {
            Some(ServerMessage::PartitionUpdate {
                session_id,
                partition_number: partition.number,
                status: partition.status.into(),
            })
        }
        PanelStateChange::ZoneStateChanged { session_id, zone } => Some(ServerMessage::ZoneUpdate {
            session_id,
            zone_number: zone.number,
            open: zone.is_open,
        }),
        PanelStateChange::SessionStateChanged { .. } => None,
    }
}

/// Returns `false` if the socket should be closed (a send failed).
async fn handle_client_message(socket: &mut WebSocket, state: &AppState, msg: ClientMessage) -> bool {
    match msg {
        ClientMessage::GetFullState => {
            let full_state = ServerMessage::FullState {
                sessions: build_full_state(state).await,
            };
            send(socket, &full_state).await
        }
        ClientMessage::ArmAway(req) => dispatch_arm_command(socket, state, req, ArmMode::AwayArm).await,
        ClientMessage::ArmHome(req) => dispatch_arm_command(socket, state, req, ArmMode::StayArm).await,
        ClientMessage::ArmNight(req) => dispatch_arm_command(socket, state, req, ArmMode::NightArm).await,
        ClientMessage::Disarm(req) => dispatch_arm_command(socket, state, req, ArmMode::Disarm).await,
    }
}

async fn dispatch_arm_command(
    socket: &mut WebSocket,
    state: &AppState,
    req: ArmDisarmRequest,
    arm_mode: ArmMode,
) -> bool {
    let handle = match state.session_registry.get(&req.session_id).await {
        Ok(handle) => handle,
        Err(e) => {
            let err = ServerMessage::Error { message: e.to_string() };
            return send(socket, &err).await;
        }
    };

    let command = PartitionArmCommand {
        partition: req.partition_number,
        arm_mode,
        access_code: req.code.unwrap_or_default(),
    };

    if let Err(e) = handle.send(MessageRecord::PartitionArmCommand(command)).await {
        let err = ServerMessage::Error { message: e.to_string() };
        return send(socket, &err).await;
    }

    true
}

async fn build_full_state(state: &AppState) -> Vec<SessionDto> {
    let mut sessions = Vec::new();
    for session_id in state.session_registry.list_ids().await {
        let partitions = state
            .panel_state
            .list_partitions(&session_id)
            .await
            .into_iter()
            .map(|p| PartitionDto {
                partition_number: p.number,
                name: None,
                status: p.status.into(),
            })
            .collect();

        let zones = state
            .panel_state
            .list_zones(&session_id)
            .await
            .into_iter()
            .map(|z| ZoneDto {
                zone_number: z.number,
                name: z.name,
                device_class: z.device_class,
                open: z.is_open,
                partitions: z.partitions,
            })
            .collect();

        sessions.push(SessionDto {
            session_id,
            name: None,
            partitions,
            zones,
        });
    }
    sessions
}
