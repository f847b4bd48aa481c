//! Validated appends to the chat log, fanned out through the message feed.
//!
//! The relay is the server-side half of the live chat: it owns the
//! authoritative per-user throttle, writes one row per accepted send and
//! notifies the room's feed subscribers once the row is stored.

use std::future::Future;
use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, warn};

use crate::cooldown::{CoolingDown, RateLimiter, SEND_COOLDOWN};
use crate::error::RelayError;
use crate::feed::{FeedSubscription, MessageFeed};
use crate::model::{ANONYMOUS, ChatMessage, NewChatMessage};
use crate::store::{MessageStore, RoomStore};

/// Messages loaded when a client joins a room.
pub const INITIAL_FETCH_LIMIT: usize = 200;

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// What a [`crate::chat::LiveChat`] needs from the other side of the wire.
pub trait ChatTransport: Send + Sync {
    /// The `limit` most recent messages of the room, oldest first.
    fn fetch_recent(
        &self,
        room_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, RelayError>> + Send;

    /// Append one message. The stored row is echoed through the feed.
    fn insert(&self, message: NewChatMessage) -> impl Future<Output = Result<ChatMessage, RelayError>> + Send;

    fn subscribe(&self, room_id: &str) -> FeedSubscription;
}

pub struct Relay<S> {
    store: Arc<S>,
    feed: MessageFeed,
    limiter: Arc<RateLimiter>,
}

impl<S> Clone for Relay<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            feed: self.feed.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<S: RoomStore + MessageStore> Relay<S> {
    pub fn new(store: Arc<S>, feed: MessageFeed) -> Self {
        Self::with_cooldown(store, feed, SEND_COOLDOWN)
    }

    pub fn with_cooldown(store: Arc<S>, feed: MessageFeed, window: std::time::Duration) -> Self {
        Self { store, feed, limiter: Arc::new(RateLimiter::new(window)) }
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    /// The latest [`INITIAL_FETCH_LIMIT`] messages of a room, oldest first.
    pub async fn recent(&self, room_id: &str) -> Result<Vec<ChatMessage>, RelayError> {
        self.ensure_room(room_id).await?;
        Ok(self.store.recent_messages(room_id, INITIAL_FETCH_LIMIT).await?)
    }

    /// Validate, throttle, store and publish one message.
    pub async fn post(&self, new: NewChatMessage) -> Result<ChatMessage, RelayError> {
        let text = new.text.trim();
        if text.is_empty() {
            return Err(RelayError::BadRequest("message text is empty".into()));
        }
        let user_id = new
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(RelayError::Unauthenticated)?;
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(RelayError::BadRequest(format!(
                "message is longer than {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let room = self.ensure_room(&new.room_id).await?;
        if !room.is_visible_at(Utc::now()) {
            return Err(RelayError::BadRequest("room has ended".into()));
        }

        self.limiter
            .try_acquire(user_id)
            .map_err(|CoolingDown { remaining }| RelayError::RateLimited { retry_after: remaining })?;

        let username = match new.username.trim() {
            "" => ANONYMOUS.to_owned(),
            name => name.to_owned(),
        };
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room.id,
            user_id: Some(user_id.to_owned()),
            username,
            text: text.to_owned(),
            emoji: None,
            created_at: Utc::now().trunc_subsecs(6),
        };

        if let Err(e) = self.store.insert_message(message.clone()).await {
            self.limiter.release(user_id);
            warn!(room_id = %message.room_id, error = %e, "failed to store chat message");
            return Err(e.into());
        }

        let delivered = self.feed.publish(&message);
        debug!(room_id = %message.room_id, message_id = %message.id, delivered, "chat message relayed");
        Ok(message)
    }

    pub fn subscribe(&self, room_id: &str) -> FeedSubscription {
        self.feed.subscribe(room_id)
    }

    async fn ensure_room(&self, room_id: &str) -> Result<crate::model::Room, RelayError> {
        self.store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("room {room_id}")))
    }
}

impl<S: RoomStore + MessageStore> ChatTransport for Relay<S> {
    async fn fetch_recent(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>, RelayError> {
        self.ensure_room(room_id).await?;
        Ok(self.store.recent_messages(room_id, limit).await?)
    }

    async fn insert(&self, message: NewChatMessage) -> Result<ChatMessage, RelayError> {
        self.post(message).await
    }

    fn subscribe(&self, room_id: &str) -> FeedSubscription {
        self.feed.subscribe(room_id)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::feed::FeedEvent;
    use crate::model::{Room, RoomStatus};
    use crate::store::SqliteStore;
    use std::time::Duration;

    async fn relay_with_room() -> (Relay<SqliteStore>, Arc<SqliteStore>, Room) {
        let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
        let room = Room::open("battle", Some(600), None, Utc::now());
        store.create_room(room.clone()).await.expect("room");
        (Relay::new(Arc::clone(&store), MessageFeed::default()), store, room)
    }

    fn new_message(room_id: &str, user_id: Option<&str>, text: &str) -> NewChatMessage {
        NewChatMessage {
            room_id: room_id.into(),
            user_id: user_id.map(str::to_owned),
            username: "alice".into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn accepted_message_is_stored_and_published() {
        let (relay, store, room) = relay_with_room().await;
        let mut sub = relay.subscribe(&room.id);

        let stored = relay
            .post(new_message(&room.id, Some("u1"), "  hello  "))
            .await
            .expect("post");
        assert_eq!(stored.text, "hello");
        assert_eq!(stored.user_id.as_deref(), Some("u1"));

        assert_eq!(sub.recv().await, Some(FeedEvent::Insert(stored.clone())));
        let rows = store.recent_messages(&room.id, 10).await.expect("rows");
        assert_eq!(rows, vec![stored]);
    }

    #[tokio::test]
    async fn validation_failures() {
        let (relay, _store, room) = relay_with_room().await;

        assert!(matches!(
            relay.post(new_message(&room.id, Some("u1"), "   ")).await,
            Err(RelayError::BadRequest(_))
        ));
        assert!(matches!(
            relay.post(new_message(&room.id, None, "hi")).await,
            Err(RelayError::Unauthenticated)
        ));
        let long = "가".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            relay.post(new_message(&room.id, Some("u1"), &long)).await,
            Err(RelayError::BadRequest(_))
        ));
        assert!(matches!(
            relay.post(new_message("missing", Some("u1"), "hi")).await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn exactly_max_chars_is_accepted() {
        let (relay, _store, room) = relay_with_room().await;
        let text = "가".repeat(MAX_MESSAGE_CHARS);
        assert!(relay.post(new_message(&room.id, Some("u1"), &text)).await.is_ok());
    }

    #[tokio::test]
    async fn ended_room_rejects_messages() {
        let (relay, store, room) = relay_with_room().await;
        store.set_room_status(&room.id, RoomStatus::Ended).await.expect("end");
        assert!(matches!(
            relay.post(new_message(&room.id, Some("u1"), "hi")).await,
            Err(RelayError::BadRequest(m)) if m == "room has ended"
        ));
    }

    #[tokio::test]
    async fn second_send_within_window_is_rate_limited() {
        let (_, store, room) = relay_with_room().await;
        let relay = Relay::with_cooldown(Arc::clone(&store), MessageFeed::default(), Duration::from_millis(100));
        relay.post(new_message(&room.id, Some("u1"), "one")).await.expect("first");

        let err = relay
            .post(new_message(&room.id, Some("u1"), "two"))
            .await
            .expect_err("throttled");
        assert!(err.to_string().contains("rate_limit"));

        // Another user is unaffected.
        relay.post(new_message(&room.id, Some("u2"), "three")).await.expect("other user");

        tokio::time::sleep(Duration::from_millis(150)).await;
        relay.post(new_message(&room.id, Some("u1"), "four")).await.expect("after window");

        let texts: Vec<_> = store
            .recent_messages(&room.id, 10)
            .await
            .expect("rows")
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["one", "three", "four"]);
    }

    #[tokio::test]
    async fn blank_username_becomes_anonymous() {
        let (relay, _store, room) = relay_with_room().await;
        let mut msg = new_message(&room.id, Some("u1"), "hi");
        msg.username = "  ".into();
        assert_eq!(relay.post(msg).await.expect("post").username, ANONYMOUS);
    }
}
