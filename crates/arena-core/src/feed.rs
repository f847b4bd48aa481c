//! Insertion notifications for the chat log, filtered by room id.
//!
//! One broadcast sender per room, created on first subscription. Dropping a
//! [`FeedSubscription`] is the unsubscribe; senders left without receivers
//! are pruned on the next publish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::model::ChatMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedEvent {
    /// A row was appended to the room's log.
    Insert(ChatMessage),
}

impl FeedEvent {
    pub fn room_id(&self) -> &str {
        match self {
            FeedEvent::Insert(msg) => &msg.room_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageFeed {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<FeedEvent>>>>,
    capacity: usize,
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MessageFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, room_id: &str) -> FeedSubscription {
        let rx = match self.channels.lock() {
            Ok(mut channels) => channels
                .entry(room_id.to_owned())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe(),
            // Poisoned: the sender is dropped at once, so the subscription
            // reports closed and the live stream ends.
            Err(_) => broadcast::channel(1).0.subscribe(),
        };
        FeedSubscription { room_id: room_id.to_owned(), rx }
    }

    /// Notify subscribers of `message.room_id`. Returns how many received it.
    pub fn publish(&self, message: &ChatMessage) -> usize {
        let Ok(mut channels) = self.channels.lock() else {
            return 0;
        };
        channels.retain(|_, tx| tx.receiver_count() > 0);
        match channels.get(&message.room_id) {
            Some(tx) => tx.send(FeedEvent::Insert(message.clone())).unwrap_or(0),
            None => 0,
        }
    }

    /// Rooms that currently have at least one live channel.
    pub fn active_rooms(&self) -> usize {
        self.channels
            .lock()
            .map(|c| c.values().filter(|tx| tx.receiver_count() > 0).count())
            .unwrap_or(0)
    }
}

/// A live subscription to one room's insertions.
#[derive(Debug)]
pub struct FeedSubscription {
    room_id: String,
    rx: broadcast::Receiver<FeedEvent>,
}

impl FeedSubscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Wait for the next event. `None` once the feed is gone.
    ///
    /// A lagging receiver skips what it missed; the caller's view then has a
    /// gap until the next initial fetch.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.room_id() == self.room_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(room_id = %self.room_id, skipped, "feed subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.room_id() == self.room_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(room_id = %self.room_id, skipped, "feed subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn message(id: &str, room_id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            room_id: room_id.into(),
            user_id: Some("u1".into()),
            username: "alice".into(),
            text: "hi".into(),
            emoji: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_room() {
        let feed = MessageFeed::default();
        let mut r1 = feed.subscribe("r1");
        let mut r2 = feed.subscribe("r2");

        let m1 = message("m1", "r1");
        assert_eq!(feed.publish(&m1), 1);
        assert_eq!(r1.recv().await, Some(FeedEvent::Insert(m1)));
        assert!(r2.try_recv().is_none());
    }

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let feed = MessageFeed::default();
        assert_eq!(feed.publish(&message("m1", "r1")), 0);
    }

    #[test]
    fn every_subscriber_of_a_room_gets_the_event() {
        let feed = MessageFeed::default();
        let mut a = feed.subscribe("r1");
        let mut b = feed.subscribe("r1");
        assert_eq!(feed.publish(&message("m1", "r1")), 2);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let feed = MessageFeed::default();
        let sub = feed.subscribe("r1");
        assert_eq!(sub.room_id(), "r1");
        assert_eq!(feed.active_rooms(), 1);
        drop(sub);
        assert_eq!(feed.active_rooms(), 0);
        assert_eq!(feed.publish(&message("m1", "r1")), 0);
    }

    #[test]
    fn lagging_subscriber_skips_to_what_is_left() {
        let feed = MessageFeed::new(2);
        let mut sub = feed.subscribe("r1");
        for i in 0..5 {
            feed.publish(&message(&format!("m{i}"), "r1"));
        }
        let first = sub.try_recv().map(|FeedEvent::Insert(m)| m.id);
        assert_eq!(first.as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn poisoned_feed_hands_out_a_closed_subscription() {
        let feed = MessageFeed::default();
        let channels = Arc::clone(&feed.channels);
        let _ = std::thread::spawn(move || {
            let _held = channels.lock();
            panic!("poison the feed lock");
        })
        .join();

        let mut sub = feed.subscribe("r1");
        assert_eq!(sub.recv().await, None);
    }
}
