//! Panel-state store (component C8): per-session partition/zone records
//! with derived state and a typed change-event stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use itv2_wire::messages::{ArmMode, ReadyStatus, ZoneStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    Unknown,
    Disarmed,
    ArmedAway,
    ArmedHome,
    ArmedNight,
    Arming,
    Pending,
    Triggered,
}

impl PartitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Disarmed => "disarmed",
            Self::ArmedAway => "armed_away",
            Self::ArmedHome => "armed_home",
            Self::ArmedNight => "armed_night",
            Self::Arming => "arming",
            Self::Pending => "pending",
            Self::Triggered => "triggered",
        }
    }

    fn from_arm_mode(mode: ArmMode) -> Self {
        match mode {
            ArmMode::Disarm => Self::Disarmed,
            ArmMode::AwayArm | ArmMode::ArmWithNoEntryDelay => Self::ArmedAway,
            ArmMode::StayArm => Self::ArmedHome,
            ArmMode::NightArm => Self::ArmedNight,
            ArmMode::Other(_) => Self::ArmedAway,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDelay {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u16,
    pub audible: bool,
    pub urgent: bool,
}

#[derive(Debug, Clone)]
pub struct PartitionState {
    pub number: u8,
    pub status: PartitionStatus,
    pub is_ready: bool,
    pub exit_delay: Option<ExitDelay>,
    pub last_updated: DateTime<Utc>,
}

impl PartitionState {
    fn new(number: u8, now: DateTime<Utc>) -> Self {
        Self {
            number,
            status: PartitionStatus::Unknown,
            is_ready: false,
            exit_delay: None,
            last_updated: now,
        }
    }

    /// Derived status (§3): during an active exit delay with positive
    /// remaining time, always reports `Arming`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PartitionStatus {
        if let Some(delay) = &self.exit_delay {
            let elapsed = (now - delay.started_at).num_seconds();
            if elapsed < i64::from(delay.duration_seconds) {
                return PartitionStatus::Arming;
            }
        }
        self.status
    }
}

#[derive(Debug, Clone)]
pub struct ZoneState {
    pub number: u16,
    pub name: Option<String>,
    pub device_class: String,
    pub is_open: bool,
    pub partitions: Vec<u8>,
    pub last_updated: DateTime<Utc>,
}

impl ZoneState {
    fn new(number: u16, now: DateTime<Utc>, default_device_class: &str) -> Self {
        let default_partition = std::cmp::max(1, (number.saturating_sub(1)) / 64 + 1) as u8;
        Self {
            number,
            name: None,
            device_class: default_device_class.to_owned(),
            is_open: false,
            partitions: vec![default_partition],
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PanelDateTimeSync {
    pub panel_date_time: chrono::NaiveDateTime,
    pub synced_at: DateTime<Utc>,
}

impl PanelDateTimeSync {
    /// The panel's estimated current time, extrapolated from the last sync.
    pub fn panel_date_time_now(&self, now: DateTime<Utc>) -> chrono::NaiveDateTime {
        self.panel_date_time + (now - self.synced_at)
    }
}

#[derive(Debug, Clone)]
pub enum PanelStateChange {
    SessionStateChanged { session_id: String },
    PartitionStateChanged { session_id: String, partition: PartitionState },
    ZoneStateChanged { session_id: String, zone: ZoneState },
}

#[derive(Debug)]
struct SessionState {
    partitions: BTreeMap<u8, PartitionState>,
    zones: BTreeMap<u16, ZoneState>,
    date_time_sync: Option<PanelDateTimeSync>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            partitions: BTreeMap::new(),
            zones: BTreeMap::new(),
            date_time_sync: None,
        }
    }
}

/// Per-session in-memory partition/zone store plus a fan-out of change
/// events. Concurrent read/write safe: an `RwLock` per session under a
/// shared map, so independent sessions never block one another.
pub struct PanelStateStore {
    sessions: RwLock<BTreeMap<String, Arc<RwLock<SessionState>>>>,
    events: broadcast::Sender<PanelStateChange>,
    default_device_class: String,
}

impl PanelStateStore {
    pub fn new(default_device_class: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            events,
            default_device_class: default_device_class.into(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelStateChange> {
        self.events.subscribe()
    }

    async fn session(&self, session_id: &str) -> Arc<RwLock<SessionState>> {
        if let Some(s) = self.sessions.read().await.get(session_id) {
            return s.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| Arc::new(RwLock::new(SessionState::new())))
            .clone()
    }

    pub async fn remove_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
        let _ = self.events.send(PanelStateChange::SessionStateChanged {
            session_id: session_id.to_owned(),
        });
    }

    pub async fn list_partitions(&self, session_id: &str) -> Vec<PartitionState> {
        self.session(session_id)
            .await
            .read()
            .await
            .partitions
            .values()
            .cloned()
            .collect()
    }

    pub async fn list_zones(&self, session_id: &str) -> Vec<ZoneState> {
        self.session(session_id)
            .await
            .read()
            .await
            .zones
            .values()
            .cloned()
            .collect()
    }

    pub async fn get_partition(&self, session_id: &str, number: u8) -> Option<PartitionState> {
        self.session(session_id)
            .await
            .read()
            .await
            .partitions
            .get(&number)
            .cloned()
    }

    pub async fn date_time_sync(&self, session_id: &str) -> Option<PanelDateTimeSync> {
        self.session(session_id).await.read().await.date_time_sync.clone()
    }

    fn emit(&self, change: PanelStateChange) {
        let _ = self.events.send(change);
    }

    // -- handler rules (§4.8, invoked by C9) --

    pub async fn handle_arm_disarm(&self, session_id: &str, partition: u8, arm_mode: ArmMode, now: DateTime<Utc>) {
        let session = self.session(session_id).await;
        let mut guard = session.write().await;
        let state = guard
            .partitions
            .entry(partition)
            .or_insert_with(|| PartitionState::new(partition, now));
        state.status = PartitionStatus::from_arm_mode(arm_mode);
        if matches!(arm_mode, ArmMode::Disarm) {
            state.exit_delay = None;
        }
        state.last_updated = now;
        let snapshot = state.clone();
        drop(guard);
        self.emit(PanelStateChange::PartitionStateChanged {
            session_id: session_id.to_owned(),
            partition: snapshot,
        });
    }

    pub async fn handle_ready_status(
        &self,
        session_id: &str,
        partition: u8,
        status: ReadyStatus,
        now: DateTime<Utc>,
    ) {
        let session = self.session(session_id).await;
        let mut guard = session.write().await;
        let state = guard
            .partitions
            .entry(partition)
            .or_insert_with(|| PartitionState::new(partition, now));
        state.is_ready = matches!(status, ReadyStatus::ReadyToArm | ReadyStatus::ReadyToForceArm);
        // Invariant I4: unconditionally clears to Disarmed and drops exit-delay.
        state.status = PartitionStatus::Disarmed;
        state.exit_delay = None;
        state.last_updated = now;
        let snapshot = state.clone();
        drop(guard);
        self.emit(PanelStateChange::PartitionStateChanged {
            session_id: session_id.to_owned(),
            partition: snapshot,
        });
    }

    pub async fn handle_exit_delay(
        &self,
        session_id: &str,
        partition: u8,
        active: bool,
        duration_seconds: u16,
        audible: bool,
        urgent: bool,
        now: DateTime<Utc>,
    ) {
        let session = self.session(session_id).await;
        let mut guard = session.write().await;
        let state = guard
            .partitions
            .entry(partition)
            .or_insert_with(|| PartitionState::new(partition, now));

        if active && duration_seconds > 0 {
            // Invariant I3: preserve startedAt when re-notified with the
            // same active delay and duration.
            let keep_started_at = state
                .exit_delay
                .is_some_and(|d| d.duration_seconds == duration_seconds);
            let started_at = if keep_started_at {
                state.exit_delay.unwrap().started_at
            } else {
                now
            };
            state.exit_delay = Some(ExitDelay {
                started_at,
                duration_seconds,
                audible,
                urgent,
            });
        } else {
            state.exit_delay = None;
        }
        state.last_updated = now;
        let snapshot = state.clone();
        drop(guard);
        self.emit(PanelStateChange::PartitionStateChanged {
            session_id: session_id.to_owned(),
            partition: snapshot,
        });
    }

    pub async fn handle_zone_status(&self, session_id: &str, zone: u16, status: ZoneStatus, now: DateTime<Utc>) {
        let session = self.session(session_id).await;
        let mut guard = session.write().await;
        let default_class = self.default_device_class.clone();
        let state = guard
            .zones
            .entry(zone)
            .or_insert_with(|| ZoneState::new(zone, now, &default_class));
        state.is_open = matches!(status, ZoneStatus::Open);
        state.last_updated = now;
        let snapshot = state.clone();
        drop(guard);
        self.emit(PanelStateChange::ZoneStateChanged {
            session_id: session_id.to_owned(),
            zone: snapshot,
        });
    }

    pub async fn handle_date_time_broadcast(
        &self,
        session_id: &str,
        panel_date_time: chrono::NaiveDateTime,
        now: DateTime<Utc>,
    ) {
        let session = self.session(session_id).await;
        let mut guard = session.write().await;
        guard.date_time_sync = Some(PanelDateTimeSync {
            panel_date_time,
            synced_at: now,
        });
        drop(guard);
        self.emit(PanelStateChange::SessionStateChanged {
            session_id: session_id.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn arm_disarm_updates_status() {
        let store = PanelStateStore::new("door");
        store
            .handle_arm_disarm("s1", 1, ArmMode::AwayArm, at(0))
            .await;
        let p = store.get_partition("s1", 1).await.unwrap();
        assert_eq!(p.status, PartitionStatus::ArmedAway);
    }

    #[tokio::test]
    async fn exit_delay_idempotence_preserves_started_at() {
        let store = PanelStateStore::new("door");
        store
            .handle_exit_delay("s1", 1, true, 60, true, false, at(0))
            .await;
        store
            .handle_exit_delay("s1", 1, true, 60, true, false, at(5))
            .await;
        let p = store.get_partition("s1", 1).await.unwrap();
        assert_eq!(p.exit_delay.unwrap().started_at, at(0));
    }

    #[tokio::test]
    async fn ready_status_overrides_prior_state() {
        let store = PanelStateStore::new("door");
        store
            .handle_exit_delay("s1", 1, true, 60, true, false, at(0))
            .await;
        store
            .handle_ready_status("s1", 1, ReadyStatus::ReadyToArm, at(1))
            .await;
        let p = store.get_partition("s1", 1).await.unwrap();
        assert_eq!(p.status, PartitionStatus::Disarmed);
        assert!(p.is_ready);
        assert!(p.exit_delay.is_none());
    }

    #[tokio::test]
    async fn effective_status_reports_arming_during_exit_delay() {
        let store = PanelStateStore::new("door");
        store
            .handle_arm_disarm("s1", 1, ArmMode::AwayArm, at(0))
            .await;
        store
            .handle_exit_delay("s1", 1, true, 60, true, false, at(0))
            .await;
        let p = store.get_partition("s1", 1).await.unwrap();
        assert_eq!(p.effective_status(at(10)), PartitionStatus::Arming);
        assert_eq!(p.effective_status(at(100)), PartitionStatus::ArmedAway);
    }

    #[tokio::test]
    async fn zone_status_lazily_creates_with_derived_partition() {
        let store = PanelStateStore::new("door");
        store
            .handle_zone_status("s1", 65, ZoneStatus::Open, at(0))
            .await;
        let zones = store.list_zones("s1").await;
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].partitions, vec![2]);
        assert!(zones[0].is_open);
    }
}
