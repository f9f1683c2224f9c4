//! Scenario 6 (§8): an exit delay in progress is preempted by a ready
//! status notification, landing on `Disarmed` with the delay cleared.
//! Also covers the exit-delay idempotence (I3) and ready-overrides (I4)
//! invariants the scenario depends on.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use itv2_engine::dispatch;
use itv2_engine::{PanelStateStore, PartitionStatus};
use itv2_wire::messages::{
    MessageRecord, NotificationExitDelay, NotificationPartitionReadyStatus, ReadyStatus,
};

const SESSION_ID: &str = "123456789012";

fn exit_delay_record(partition: u8) -> MessageRecord {
    MessageRecord::NotificationExitDelay(NotificationExitDelay {
        partition,
        active: true,
        duration_seconds: 60,
        audible: true,
        urgent: false,
        restarted: false,
    })
}

#[tokio::test]
async fn exit_delay_then_ready_status_preempts_to_disarmed() {
    let store = Arc::new(PanelStateStore::new("door"));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let dispatcher = tokio::spawn(dispatch::run(inbound_rx, store.clone()));

    inbound_tx
        .send(itv2_engine::InboundNotification {
            session_id: SESSION_ID.to_owned(),
            record: exit_delay_record(1),
        })
        .unwrap();
    inbound_tx
        .send(itv2_engine::InboundNotification {
            session_id: SESSION_ID.to_owned(),
            record: MessageRecord::NotificationPartitionReadyStatus(NotificationPartitionReadyStatus {
                partition: 1,
                status: ReadyStatus::ReadyToArm,
            }),
        })
        .unwrap();
    drop(inbound_tx);
    dispatcher.await.unwrap();

    let partition = store.get_partition(SESSION_ID, 1).await.unwrap();
    assert_eq!(partition.status, PartitionStatus::Disarmed);
    assert!(partition.is_ready);
    assert!(partition.exit_delay.is_none());
}

#[tokio::test]
async fn repeated_identical_exit_delay_notification_is_idempotent() {
    let store = PanelStateStore::new("door");
    let now = Utc::now();

    store.handle_exit_delay(SESSION_ID, 1, true, 60, true, false, now).await;
    let first = store.get_partition(SESSION_ID, 1).await.unwrap();
    let first_started_at = first.exit_delay.unwrap().started_at;

    let later = now + chrono::Duration::seconds(5);
    store.handle_exit_delay(SESSION_ID, 1, true, 60, true, false, later).await;
    let second = store.get_partition(SESSION_ID, 1).await.unwrap();

    assert_eq!(second.exit_delay.unwrap().started_at, first_started_at);
}

#[tokio::test]
async fn ready_status_clears_prior_state_regardless_of_what_preceded_it() {
    let store = PanelStateStore::new("door");
    let now = Utc::now();

    store.handle_exit_delay(SESSION_ID, 1, true, 60, true, false, now).await;
    store
        .handle_ready_status(SESSION_ID, 1, ReadyStatus::ReadyToArm, now)
        .await;

    let partition = store.get_partition(SESSION_ID, 1).await.unwrap();
    assert_eq!(partition.status, PartitionStatus::Disarmed);
    assert!(partition.exit_delay.is_none());
}
