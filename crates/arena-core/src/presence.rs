//! Presence: approximate live-viewer counts from heartbeats.
//!
//! Every connection publishes a [`Heartbeat`] `{ room_id, ts }` on one shared
//! [`PresenceHub`] under a [`ConnectionKey`]. Each track/untrack broadcasts a
//! full-state snapshot ([`PresenceEvent::Sync`]); trackers recount from the
//! snapshot rather than from deltas.
//!
//! A key may be tracked by several connections at once (the same user in two
//! tabs). The snapshot keeps only the most recently published heartbeat per
//! key, so a key is counted once, for the room it last announced. Keep-alive
//! refreshes only liveness and never changes which heartbeat wins.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Room id the audience lobby announces itself under.
pub const LOBBY_ROOM: &str = "lobby";
/// Connection key shared by every lobby viewer.
pub const LOBBY_KEY: &str = "audience-lobby";

/// Stable per-connection identity on the presence channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The user id for signed-in viewers, otherwise a random `anon-<uuid>`
    /// that lives as long as the connection.
    pub fn for_user(user_id: Option<&str>) -> Self {
        match user_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self(id.to_owned()),
            None => Self(format!("anon-{}", uuid::Uuid::new_v4())),
        }
    }

    pub fn lobby() -> Self {
        Self(LOBBY_KEY.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub room_id: String,
    pub ts: DateTime<Utc>,
}

/// Full presence snapshot: latest heartbeat per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceState {
    entries: HashMap<ConnectionKey, Heartbeat>,
}

impl PresenceState {
    /// Number of distinct keys whose latest heartbeat names `room_id`.
    pub fn count_for(&self, room_id: &str) -> usize {
        self.entries.values().filter(|hb| hb.room_id == room_id).count()
    }

    /// Per-room counts restricted to `room_ids`; rooms nobody announced are
    /// absent from the map rather than zero.
    pub fn counts_for<'a>(&self, room_ids: impl IntoIterator<Item = &'a str>) -> HashMap<String, usize> {
        let wanted: HashSet<&str> = room_ids.into_iter().collect();
        let mut counts = HashMap::new();
        for hb in self.entries.values() {
            if wanted.contains(hb.room_id.as_str()) {
                *counts.entry(hb.room_id.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&Heartbeat> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Events published on the presence channel.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Join { key: ConnectionKey, heartbeat: Heartbeat },
    Leave { key: ConnectionKey },
    /// Full state after the change that triggered it.
    Sync(Arc<PresenceState>),
}

#[derive(Debug)]
struct Connection {
    /// Allocated in publish order.
    id: u64,
    heartbeat: Heartbeat,
    /// Last keep-alive; only the sweeper reads it.
    last_seen: DateTime<Utc>,
}

#[derive(Debug)]
struct HubInner {
    connections: RwLock<HashMap<ConnectionKey, Vec<Connection>>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<PresenceEvent>,
}

/// The shared presence channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PresenceHub {
    inner: Arc<HubInner>,
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl PresenceHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                connections: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                tx,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.tx.subscribe()
    }

    /// Publish a heartbeat for `room_id` under `key`. The entry lives until the
    /// returned guard is dropped or the sweeper finds it stale.
    pub fn track(&self, key: ConnectionKey, room_id: impl Into<String>) -> PresenceGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let heartbeat = Heartbeat { room_id: room_id.into(), ts: Utc::now() };
        if let Ok(mut map) = self.inner.connections.write() {
            map.entry(key.clone()).or_default().push(Connection {
                id,
                heartbeat: heartbeat.clone(),
                last_seen: heartbeat.ts,
            });
        }
        debug!(key = %key, room_id = %heartbeat.room_id, "presence tracked");
        self.publish(PresenceEvent::Join { key: key.clone(), heartbeat });
        self.publish_sync();
        PresenceGuard { hub: self.clone(), key, id }
    }

    /// Most recently published heartbeat per key.
    pub fn snapshot(&self) -> PresenceState {
        let Ok(map) = self.inner.connections.read() else {
            return PresenceState::default();
        };
        let entries = map
            .iter()
            .filter_map(|(key, conns)| {
                conns
                    .iter()
                    .max_by_key(|c| c.id)
                    .map(|c| (key.clone(), c.heartbeat.clone()))
            })
            .collect();
        PresenceState { entries }
    }

    /// Drop every connection not seen within `ttl` of `now`.
    /// Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut left = Vec::new();
        let mut removed = 0;
        if let Ok(mut map) = self.inner.connections.write() {
            map.retain(|key, conns| {
                let before = conns.len();
                conns.retain(|c| now - c.last_seen <= ttl);
                removed += before - conns.len();
                if conns.is_empty() {
                    left.push(key.clone());
                    false
                } else {
                    true
                }
            });
        }
        for key in left {
            self.publish(PresenceEvent::Leave { key });
        }
        if removed > 0 {
            debug!(removed, "presence sweep removed stale connections");
            self.publish_sync();
        }
        removed
    }

    fn touch(&self, key: &ConnectionKey, id: u64) {
        if let Ok(mut map) = self.inner.connections.write() {
            if let Some(conn) = map.get_mut(key).and_then(|c| c.iter_mut().find(|c| c.id == id)) {
                conn.last_seen = Utc::now();
            }
        }
    }

    fn untrack(&self, key: &ConnectionKey, id: u64) {
        let mut gone = false;
        let mut found = false;
        if let Ok(mut map) = self.inner.connections.write() {
            if let Some(conns) = map.get_mut(key) {
                let before = conns.len();
                conns.retain(|c| c.id != id);
                found = conns.len() != before;
                if conns.is_empty() {
                    map.remove(key);
                    gone = true;
                }
            }
        }
        if !found {
            // Already swept.
            return;
        }
        debug!(key = %key, "presence untracked");
        if gone {
            self.publish(PresenceEvent::Leave { key: key.clone() });
        }
        self.publish_sync();
    }

    fn publish_sync(&self) {
        self.publish(PresenceEvent::Sync(Arc::new(self.snapshot())));
    }

    fn publish(&self, event: PresenceEvent) {
        // No subscribers is not an error: the snapshot is still queryable.
        let _ = self.inner.tx.send(event);
    }
}

/// Keeps one connection's heartbeat on the hub; dropping it untracks.
#[derive(Debug)]
pub struct PresenceGuard {
    hub: PresenceHub,
    key: ConnectionKey,
    id: u64,
}

impl PresenceGuard {
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Mark the connection alive for the sweeper (channel keep-alive). The
    /// published heartbeat is unchanged, so nothing is broadcast.
    pub fn touch(&self) {
        self.hub.touch(&self.key, self.id);
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.hub.untrack(&self.key, self.id);
    }
}

/// Periodically drop heartbeats that stopped refreshing.
pub async fn run_sweeper(hub: PresenceHub, ttl: Duration, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        hub.sweep(Utc::now(), ttl);
    }
}

/// A client's view of the count for one room.
///
/// Only [`PresenceEvent::Sync`] changes the count. When the channel fails or
/// lags the last known value stays put.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    room_id: String,
    count: usize,
}

impl PresenceTracker {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), count: 0 }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Recount from a snapshot. Returns the new count when it changed.
    pub fn on_sync(&mut self, state: &PresenceState) -> Option<usize> {
        let count = state.count_for(&self.room_id);
        if count == self.count {
            return None;
        }
        self.count = count;
        Some(count)
    }

    pub fn on_event(&mut self, event: &PresenceEvent) -> Option<usize> {
        match event {
            PresenceEvent::Sync(state) => self.on_sync(state),
            PresenceEvent::Join { .. } | PresenceEvent::Leave { .. } => None,
        }
    }

    /// Apply one receive result from the hub's channel.
    pub fn on_recv(
        &mut self,
        received: Result<PresenceEvent, broadcast::error::RecvError>,
    ) -> Option<usize> {
        match received {
            Ok(event) => self.on_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(room_id = %self.room_id, skipped, "presence receiver lagged; keeping last count");
                None
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    fn last_sync(rx: &mut broadcast::Receiver<PresenceEvent>) -> Option<Arc<PresenceState>> {
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let PresenceEvent::Sync(state) = event {
                last = Some(state);
            }
        }
        last
    }

    #[test]
    fn anonymous_keys_are_unique() {
        let a = ConnectionKey::for_user(None);
        let b = ConnectionKey::for_user(Some("   "));
        assert!(a.as_str().starts_with("anon-"));
        assert_ne!(a, b);
        assert_eq!(ConnectionKey::for_user(Some("u1")).as_str(), "u1");
    }

    #[test]
    fn count_is_distinct_keys_per_room() {
        let hub = PresenceHub::default();
        let _a = hub.track(ConnectionKey::new("alice"), "r1");
        let _b = hub.track(ConnectionKey::new("bob"), "r1");
        let _c = hub.track(ConnectionKey::new("carol"), "r2");
        // Second tab for alice in the same room.
        let _a2 = hub.track(ConnectionKey::new("alice"), "r1");

        let state = hub.snapshot();
        assert_eq!(state.count_for("r1"), 2);
        assert_eq!(state.count_for("r2"), 1);
        assert_eq!(state.count_for("r3"), 0);
    }

    #[test]
    fn latest_heartbeat_decides_the_room() {
        let hub = PresenceHub::default();
        let first = hub.track(ConnectionKey::new("alice"), "r1");
        std::thread::sleep(Duration::from_millis(2));
        let second = hub.track(ConnectionKey::new("alice"), "r2");

        let state = hub.snapshot();
        assert_eq!(state.count_for("r1"), 0);
        assert_eq!(state.count_for("r2"), 1);

        drop(second);
        assert_eq!(hub.snapshot().count_for("r1"), 1);
        drop(first);
        assert!(hub.snapshot().is_empty());
    }

    #[test]
    fn dropping_guard_publishes_leave_and_sync() {
        let hub = PresenceHub::default();
        let mut rx = hub.subscribe();
        let guard = hub.track(ConnectionKey::new("alice"), "r1");
        assert_eq!(last_sync(&mut rx).map(|s| s.count_for("r1")), Some(1));

        drop(guard);
        let mut saw_leave = false;
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                PresenceEvent::Leave { key } => {
                    assert_eq!(key.as_str(), "alice");
                    saw_leave = true;
                }
                PresenceEvent::Sync(state) => last = Some(state),
                PresenceEvent::Join { .. } => {}
            }
        }
        assert!(saw_leave);
        assert_eq!(last.map(|s| s.count_for("r1")), Some(0));
    }

    #[test]
    fn lobby_counts_only_listed_rooms() {
        let hub = PresenceHub::default();
        let _lobby = hub.track(ConnectionKey::lobby(), LOBBY_ROOM);
        let _a = hub.track(ConnectionKey::new("alice"), "r1");
        let _b = hub.track(ConnectionKey::new("bob"), "gone");

        let counts = hub.snapshot().counts_for(["r1", "r2"]);
        assert_eq!(counts.get("r1"), Some(&1));
        assert_eq!(counts.get("r2"), None);
        assert_eq!(counts.get(LOBBY_ROOM), None);
    }

    #[test]
    fn sweep_removes_stale_connections_eventually() {
        let hub = PresenceHub::default();
        let guard = hub.track(ConnectionKey::new("alice"), "r1");
        let ttl = Duration::from_secs(60);

        assert_eq!(hub.sweep(Utc::now(), ttl), 0);
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(hub.sweep(later, ttl), 1);
        assert_eq!(hub.snapshot().count_for("r1"), 0);

        // The guard outliving its sweep must not publish anything bogus.
        let mut rx = hub.subscribe();
        drop(guard);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn touch_keeps_a_connection_alive() {
        let hub = PresenceHub::default();
        let alice = ConnectionKey::new("alice");
        let touched = hub.track(alice.clone(), "r1");
        let _idle = hub.track(ConnectionKey::new("bob"), "r1");
        let published = hub.snapshot().get(&alice).map(|h| h.ts);

        std::thread::sleep(Duration::from_millis(50));
        touched.touch();
        assert_eq!(hub.sweep(Utc::now(), Duration::from_millis(25)), 1);

        let state = hub.snapshot();
        assert_eq!(state.count_for("r1"), 1);
        assert_eq!(state.get(&alice).map(|h| h.ts), published);
    }

    #[test]
    fn keepalive_on_an_older_tab_keeps_the_newer_room() {
        let hub = PresenceHub::default();
        let tab_a = hub.track(ConnectionKey::new("alice"), "r1");
        let _tab_b = hub.track(ConnectionKey::new("alice"), "r2");

        let mut rx = hub.subscribe();
        tab_a.touch();
        assert!(rx.try_recv().is_err());

        let state = hub.snapshot();
        assert_eq!(state.count_for("r1"), 0);
        assert_eq!(state.count_for("r2"), 1);
    }

    #[test]
    fn tracker_only_reports_changes() {
        let hub = PresenceHub::default();
        let mut tracker = PresenceTracker::new("r1");
        assert_eq!(tracker.count(), 0);

        let _a = hub.track(ConnectionKey::new("alice"), "r1");
        assert_eq!(tracker.on_sync(&hub.snapshot()), Some(1));
        assert_eq!(tracker.on_sync(&hub.snapshot()), None);

        let _b = hub.track(ConnectionKey::new("bob"), "r2");
        assert_eq!(tracker.on_sync(&hub.snapshot()), None);
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn tracker_keeps_last_count_when_channel_lags() {
        let mut tracker = PresenceTracker::new("r1");
        let mut state = PresenceState::default();
        state.entries.insert(
            ConnectionKey::new("alice"),
            Heartbeat { room_id: "r1".into(), ts: Utc::now() },
        );
        tracker.on_sync(&state);

        assert_eq!(tracker.on_recv(Err(broadcast::error::RecvError::Lagged(3))), None);
        assert_eq!(tracker.on_recv(Err(broadcast::error::RecvError::Closed)), None);
        assert_eq!(tracker.count(), 1);
    }
}
