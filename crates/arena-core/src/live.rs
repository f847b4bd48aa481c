//! One server-side live connection: the room's feed and its viewer count,
//! multiplexed into a single ordered stream of [`LiveEvent`]s.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{Interval, MissedTickBehavior};

use crate::feed::{FeedEvent, FeedSubscription, MessageFeed};
use crate::model::ChatMessage;
use crate::presence::{
    ConnectionKey, LOBBY_ROOM, PresenceEvent, PresenceGuard, PresenceHub, PresenceTracker,
};

/// Event pushed to a live client, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveEvent {
    Message(ChatMessage),
    Presence { room_id: String, count: usize },
}

impl LiveEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Message(_) => "message",
            LiveEvent::Presence { .. } => "presence",
        }
    }
}

pub struct LiveConnection {
    feed: FeedSubscription,
    presence: broadcast::Receiver<PresenceEvent>,
    presence_open: bool,
    tracker: PresenceTracker,
    guard: PresenceGuard,
    keepalive: Interval,
}

impl LiveConnection {
    /// Subscribe to the room's feed and presence, then announce this
    /// connection. `keepalive` is how often the heartbeat is refreshed.
    pub fn open(
        feed: &MessageFeed,
        hub: &PresenceHub,
        room_id: &str,
        key: ConnectionKey,
        keepalive: Duration,
    ) -> Self {
        let feed = feed.subscribe(room_id);
        // Subscribe before tracking so our own join snapshot is observed.
        let presence = hub.subscribe();
        let guard = hub.track(key, room_id);
        Self {
            feed,
            presence,
            presence_open: true,
            tracker: PresenceTracker::new(room_id),
            guard,
            keepalive: keepalive_interval(keepalive),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        self.guard.key()
    }

    pub fn presence_count(&self) -> usize {
        self.tracker.count()
    }

    /// Next event for the client. `None` once the message feed is gone.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        loop {
            tokio::select! {
                event = self.feed.recv() => {
                    return match event? {
                        FeedEvent::Insert(message) => Some(LiveEvent::Message(message)),
                    };
                }
                received = self.presence.recv(), if self.presence_open => {
                    if matches!(received, Err(broadcast::error::RecvError::Closed)) {
                        self.presence_open = false;
                    }
                    if let Some(count) = self.tracker.on_recv(received) {
                        return Some(LiveEvent::Presence {
                            room_id: self.tracker.room_id().to_owned(),
                            count,
                        });
                    }
                }
                _ = self.keepalive.tick() => self.guard.touch(),
            }
        }
    }
}

fn keepalive_interval(period: Duration) -> Interval {
    let mut keepalive = tokio::time::interval(period.max(Duration::from_millis(1)));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive
}

/// The audience lobby's connection: announces itself under the shared
/// lobby key and reports viewer counts for a fixed set of rooms.
///
/// Only rooms whose count changed are reported; a room nobody watches any
/// more is reported once with `count: 0`.
pub struct LobbyConnection {
    presence: broadcast::Receiver<PresenceEvent>,
    room_ids: Vec<String>,
    counts: HashMap<String, usize>,
    pending: VecDeque<LiveEvent>,
    guard: PresenceGuard,
    keepalive: Interval,
}

impl LobbyConnection {
    /// `keepalive` is how often the lobby's own heartbeat is refreshed.
    pub fn open(hub: &PresenceHub, room_ids: Vec<String>, keepalive: Duration) -> Self {
        let presence = hub.subscribe();
        let guard = hub.track(ConnectionKey::lobby(), LOBBY_ROOM);
        Self {
            presence,
            room_ids,
            counts: HashMap::new(),
            pending: VecDeque::new(),
            guard,
            keepalive: keepalive_interval(keepalive),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        self.guard.key()
    }

    /// Next count change. `None` once the presence channel closes.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let received = tokio::select! {
                received = self.presence.recv() => received,
                _ = self.keepalive.tick() => {
                    self.guard.touch();
                    continue;
                }
            };
            match received {
                Ok(PresenceEvent::Sync(state)) => {
                    let fresh = state.counts_for(self.room_ids.iter().map(String::as_str));
                    for room_id in &self.room_ids {
                        let count = fresh.get(room_id).copied().unwrap_or(0);
                        let previous = self.counts.get(room_id).copied().unwrap_or(0);
                        if count != previous {
                            self.pending.push_back(LiveEvent::Presence { room_id: room_id.clone(), count });
                        }
                    }
                    self.counts = fresh;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
