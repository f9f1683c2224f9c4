//! End-to-end: a simulated panel reports an arm/disarm change over its TCP
//! connection, and a UI WebSocket client that already asked for the full
//! state receives a push with the updated partition status.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use itv2_engine::SessionConfig;
use itv2_wire::crypto::key_from_hex32;
use itv2_wire::messages::{ArmMode, ConnectionPoll, MessageRecord, NotificationArmDisarm};
use itv2_test_utils::MockPanelPeer;

use bridge::state::AppState;

const ACCESS_CODE_HEX: &str = "0123456789abcdef0123456789abcdef";
const SESSION_ID: &str = "123456789012";

#[tokio::test]
async fn panel_arm_notification_reaches_a_subscribed_ui_client() {
    let access_code_key = key_from_hex32(ACCESS_CODE_HEX).unwrap();
    let session_config = SessionConfig {
        type2_access_code_key: Some(access_code_key),
        ..SessionConfig::default()
    };
    let state = AppState::new("door", session_config).unwrap();

    let panel_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let panel_addr = panel_listener.local_addr().unwrap();
    tokio::spawn(bridge::panel_link::serve(panel_listener, state.clone()));

    let ui_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ui_addr = ui_listener.local_addr().unwrap();
    let router = bridge::build_router(state);
    tokio::spawn(async move {
        axum::serve(ui_listener, router).await.unwrap();
    });

    let panel_stream = tokio::net::TcpStream::connect(panel_addr).await.unwrap();
    let mut panel = MockPanelPeer::connect(panel_stream, SESSION_ID, 2048, access_code_key)
        .await
        .unwrap();

    let (ws_stream, _) = connect_async(format!("ws://{ui_addr}/ws/v1/ui")).await.unwrap();
    let (mut ws_write, mut ws_read) = ws_stream.split();

    ws_write
        .send(WsMessage::Text(r#"{"type":"get_full_state"}"#.into()))
        .await
        .unwrap();
    let full_state = next_json(&mut ws_read).await;
    assert_eq!(full_state["type"], "full_state");

    panel
        .send(
            MessageRecord::NotificationArmDisarm(NotificationArmDisarm {
                partition: 1,
                arm_mode: ArmMode::AwayArm,
            }),
            Some(1),
        )
        .await
        .unwrap();
    let (_, ack) = panel.recv().await.unwrap();
    assert!(matches!(ack, MessageRecord::SimpleAck(_)));

    let update = next_json(&mut ws_read).await;
    assert_eq!(update["type"], "partition_update");
    assert_eq!(update["session_id"], SESSION_ID);
    assert_eq!(update["partition_number"], 1);
    assert_eq!(update["status"], "armed_away");

    panel.send(MessageRecord::ConnectionPoll(ConnectionPoll), None).await.unwrap();
    let _ = panel.recv().await;
}

async fn next_json(
    read: &mut futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
) -> serde_json::Value {
    loop {
        match read.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected WS message: {other:?}"),
        }
    }
}
