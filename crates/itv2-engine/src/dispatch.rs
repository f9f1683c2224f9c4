//! Notification dispatcher (component C9): drains inbound notifications
//! from every session and routes them into the panel-state store (§4.8,
//! §4.9).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use itv2_wire::messages::MessageRecord;

use crate::session::InboundNotification;
use crate::state::PanelStateStore;

/// Consume `inbound_rx` until every sender half is dropped, applying each
/// notification to `store`. Runs as its own task; a handler error only
/// ever produces a log line, never tears down the dispatcher.
pub async fn run(mut inbound_rx: mpsc::UnboundedReceiver<InboundNotification>, store: Arc<PanelStateStore>) {
    while let Some(notification) = inbound_rx.recv().await {
        apply(&store, &notification.session_id, notification.record).await;
    }
}

async fn apply(store: &PanelStateStore, session_id: &str, record: MessageRecord) {
    let now = Utc::now();
    match record {
        MessageRecord::NotificationArmDisarm(m) => {
            store
                .handle_arm_disarm(session_id, m.partition, m.arm_mode, now)
                .await;
        }
        MessageRecord::NotificationPartitionReadyStatus(m) => {
            store
                .handle_ready_status(session_id, m.partition, m.status, now)
                .await;
        }
        MessageRecord::NotificationExitDelay(m) => {
            store
                .handle_exit_delay(
                    session_id,
                    m.partition,
                    m.active,
                    m.duration_seconds,
                    m.audible,
                    m.urgent,
                    now,
                )
                .await;
        }
        MessageRecord::NotificationLifestyleZoneStatus(m) => {
            store.handle_zone_status(session_id, m.zone, m.status, now).await;
        }
        MessageRecord::NotificationDateTimeBroadcast(m) => {
            store
                .handle_date_time_broadcast(session_id, m.panel_date_time, now)
                .await;
        }
        MessageRecord::NotificationZoneAlarm(m) => {
            debug!(session = %session_id, zone = m.zone, in_alarm = m.in_alarm, "zone alarm notification (no panel-state mapping)");
        }
        MessageRecord::NotificationTroubleStatus(m) => {
            debug!(session = %session_id, code = m.trouble_code, active = m.active, "trouble status notification (no panel-state mapping)");
        }
        MessageRecord::MultipleMessagePacket(m) => {
            for sub in m.messages {
                match MessageRecord::decode_payload(sub.command, &sub.payload) {
                    Ok(decoded) => Box::pin(apply(store, session_id, decoded)).await,
                    Err(err) => {
                        warn!(session = %session_id, command = ?sub.command, error = %err, "failed to decode sub-message, skipping");
                    }
                }
            }
        }
        other => {
            debug!(session = %session_id, command = ?other.command(), "inbound notification has no panel-state handler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itv2_wire::messages::{ArmMode, NotificationArmDisarm, NotificationLifestyleZoneStatus, ZoneStatus};

    #[tokio::test]
    async fn arm_disarm_notification_updates_store() {
        let store = Arc::new(PanelStateStore::new("door"));
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(run(rx, store.clone()));

        tx.send(InboundNotification {
            session_id: "s1".to_owned(),
            record: MessageRecord::NotificationArmDisarm(NotificationArmDisarm {
                partition: 1,
                arm_mode: ArmMode::AwayArm,
            }),
        })
        .unwrap();
        drop(tx);
        dispatcher.await.unwrap();

        let partition = store.get_partition("s1", 1).await.unwrap();
        assert_eq!(partition.status.as_str(), "armed_away");
    }

    #[tokio::test]
    async fn multiple_message_packet_fans_out_each_sub_message() {
        use itv2_wire::{CommandCode, MessageRecord as MR};

        let store = Arc::new(PanelStateStore::new("door"));
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(run(rx, store.clone()));

        let sub_record = MR::NotificationLifestyleZoneStatus(NotificationLifestyleZoneStatus {
            zone: 1,
            status: ZoneStatus::Open,
        });
        let sub = itv2_wire::messages::SubMessage {
            command: sub_record.command(),
            payload: sub_record.encode_payload(),
        };
        let _: CommandCode = sub.command;

        tx.send(InboundNotification {
            session_id: "s1".to_owned(),
            record: MessageRecord::MultipleMessagePacket(itv2_wire::messages::MultipleMessagePacket {
                messages: vec![sub],
            }),
        })
        .unwrap();
        drop(tx);
        dispatcher.await.unwrap();

        let zones = store.list_zones("s1").await;
        assert_eq!(zones.len(), 1);
        assert!(zones[0].is_open);
    }
}
