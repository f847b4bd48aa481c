//! Room directory: creating, ending and listing live rooms for the lobby.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::RelayError;
use crate::model::{MAX_ROOM_DURATION_SECS, Room, RoomStatus};
use crate::presence::PresenceState;
use crate::store::{MessageStore, RoomStore};

pub const DEFAULT_ROOM_TITLE: &str = "Live debate battle";

/// How far back a chat author still counts as a participant.
pub const PARTICIPANT_WINDOW_MINUTES: i64 = 10;

/// One lobby entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub id: String,
    pub title: String,
    pub status: RoomStatus,
    pub ends_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub remaining_seconds: i64,
    pub presence_count: Option<usize>,
    pub participant_count: Option<usize>,
    /// Presence if anyone is announced, else recent chat authors, else 0.
    pub viewer_count: usize,
    pub created_at: DateTime<Utc>,
}

pub struct RoomDirectory<S> {
    store: Arc<S>,
}

impl<S> Clone for RoomDirectory<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: RoomStore + MessageStore> RoomDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        title: Option<&str>,
        duration_seconds: Option<i64>,
        created_by: Option<String>,
    ) -> Result<Room, RelayError> {
        match duration_seconds {
            Some(d) if d <= 0 => {
                return Err(RelayError::BadRequest("duration_seconds must be positive".into()));
            }
            Some(d) if d > MAX_ROOM_DURATION_SECS => {
                return Err(RelayError::BadRequest("duration_seconds is out of range".into()));
            }
            _ => {}
        }
        let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_ROOM_TITLE);
        let room = Room::open(title, duration_seconds, created_by, Utc::now().trunc_subsecs(6));
        self.store.create_room(room.clone()).await?;
        info!(room_id = %room.id, title = %room.title, "room created");
        Ok(room)
    }

    /// Mark a room ended. Ending an ended room is a no-op.
    pub async fn end(&self, id: &str) -> Result<Room, RelayError> {
        if !self.store.set_room_status(id, RoomStatus::Ended).await? {
            return Err(RelayError::NotFound(format!("room {id}")));
        }
        info!(room_id = %id, "room ended");
        self.store
            .get_room(id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("room {id}")))
    }

    /// Rooms still visible at `now`, newest first, with viewer counts.
    pub async fn list_visible(&self, now: DateTime<Utc>, presence: &PresenceState) -> Result<Vec<RoomView>, RelayError> {
        let rooms: Vec<Room> = self
            .store
            .list_rooms()
            .await?
            .into_iter()
            .filter(|r| r.is_visible_at(now))
            .collect();
        if rooms.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rooms.iter().map(|r| r.id.clone()).collect();
        let participants = self
            .store
            .participant_counts(&ids, now - Duration::minutes(PARTICIPANT_WINDOW_MINUTES))
            .await?;
        let present = presence.counts_for(ids.iter().map(String::as_str));

        Ok(rooms
            .into_iter()
            .map(|room| {
                let presence_count = present.get(&room.id).copied();
                let participant_count = participants.get(&room.id).copied();
                RoomView {
                    remaining_seconds: room.remaining_seconds_at(now),
                    viewer_count: presence_count.or(participant_count).unwrap_or(0),
                    presence_count,
                    participant_count,
                    id: room.id,
                    title: room.title,
                    status: room.status,
                    ends_at: room.ends_at,
                    duration_seconds: room.duration_seconds,
                    created_at: room.created_at,
                }
            })
            .collect())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ChatMessage;
    use crate::presence::{ConnectionKey, PresenceHub};
    use crate::store::SqliteStore;

    async fn directory() -> (RoomDirectory<SqliteStore>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
        (RoomDirectory::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn blank_title_gets_default_and_duration_defaults() {
        let (dir, _) = directory().await;
        let room = dir.create(Some("  "), None, Some("host".into())).await.expect("create");
        assert_eq!(room.title, DEFAULT_ROOM_TITLE);
        assert_eq!(room.duration_seconds, Some(3000));
        assert!(matches!(dir.create(None, Some(0), None).await, Err(RelayError::BadRequest(_))));
    }

    #[tokio::test]
    async fn oversized_duration_is_rejected_without_panicking() {
        let (dir, store) = directory().await;
        for duration in [MAX_ROOM_DURATION_SECS + 1, i64::MAX] {
            let err = dir.create(Some("long"), Some(duration), None).await.expect_err("rejected");
            assert!(matches!(err, RelayError::BadRequest(m) if m == "duration_seconds is out of range"));
        }
        assert!(store.list_rooms().await.expect("list").is_empty());

        let room = dir.create(Some("week"), Some(MAX_ROOM_DURATION_SECS), None).await.expect("create");
        assert_eq!(room.ends_at, Some(room.created_at + Duration::seconds(MAX_ROOM_DURATION_SECS)));
    }

    #[tokio::test]
    async fn end_is_idempotent_and_unknown_is_not_found() {
        let (dir, _) = directory().await;
        let room = dir.create(Some("battle"), None, None).await.expect("create");
        assert_eq!(dir.end(&room.id).await.expect("end").status, RoomStatus::Ended);
        assert_eq!(dir.end(&room.id).await.expect("end again").status, RoomStatus::Ended);
        assert!(matches!(dir.end("missing").await, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_and_ended_rooms_are_not_listed() {
        let (dir, store) = directory().await;
        let now = Utc::now();
        let live = dir.create(Some("live"), Some(600), None).await.expect("create");
        let ended = dir.create(Some("ended"), Some(600), None).await.expect("create");
        dir.end(&ended.id).await.expect("end");
        // Status still open, but the expiry has passed.
        let expired = Room::open("expired", Some(60), None, now - Duration::minutes(5));
        store.create_room(expired).await.expect("create");

        let listed = dir.list_visible(Utc::now(), &PresenceState::default()).await.expect("list");
        let titles: Vec<_> = listed.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["live"]);
        assert_eq!(listed[0].id, live.id);
        assert!(listed[0].remaining_seconds > 0 && listed[0].remaining_seconds <= 600);
    }

    #[tokio::test]
    async fn viewer_count_prefers_presence_then_participants() {
        let (dir, store) = directory().await;
        let watched = dir.create(Some("watched"), None, None).await.expect("create");
        let chatty = dir.create(Some("chatty"), None, None).await.expect("create");
        let quiet = dir.create(Some("quiet"), None, None).await.expect("create");

        for user in ["u1", "u2", "u2"] {
            store
                .insert_message(ChatMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    room_id: chatty.id.clone(),
                    user_id: Some(user.into()),
                    username: user.into(),
                    text: "hi".into(),
                    emoji: None,
                    created_at: Utc::now(),
                })
                .await
                .expect("insert");
        }

        let hub = PresenceHub::default();
        let _a = hub.track(ConnectionKey::new("a"), watched.id.as_str());
        let _b = hub.track(ConnectionKey::new("b"), watched.id.as_str());
        let _lobby = hub.track(ConnectionKey::lobby(), crate::presence::LOBBY_ROOM);

        let listed = dir.list_visible(Utc::now(), &hub.snapshot()).await.expect("list");
        let by_title = |t: &str| listed.iter().find(|r| r.title == t).expect("listed").clone();

        let w = by_title("watched");
        assert_eq!((w.presence_count, w.viewer_count), (Some(2), 2));
        let c = by_title("chatty");
        assert_eq!((c.presence_count, c.participant_count, c.viewer_count), (None, Some(2), 2));
        let q = by_title("quiet");
        assert_eq!(q.viewer_count, 0);
        assert_eq!(quiet.id, q.id);
    }
}
