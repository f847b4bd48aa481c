//! A client's local view of one live room.
//!
//! [`LiveChat`] loads the latest messages, follows the room's feed and sends
//! through any [`ChatTransport`]. The view is keyed by message id and kept
//! ordered by `(created_at, id)`, so duplicate or out-of-order notifications
//! never corrupt it. Sent messages are not appended locally; they show up
//! when the feed echoes the stored row.

use std::collections::HashSet;

use tokio::time::Instant;
use tracing::warn;

use crate::cooldown::{CooldownGate, CoolingDown};
use crate::error::{RelayError, SendError};
use crate::feed::{FeedEvent, FeedSubscription};
use crate::model::{ChatMessage, Identity, NewChatMessage};
use crate::relay::{ChatTransport, INITIAL_FETCH_LIMIT};

pub struct LiveChat<T> {
    transport: T,
    room_id: String,
    identity: Option<Identity>,
    subscription: FeedSubscription,
    messages: Vec<ChatMessage>,
    seen: HashSet<String>,
    input: String,
    gate: CooldownGate,
    last_error: Option<SendError>,
}

impl<T: ChatTransport> LiveChat<T> {
    /// Subscribe to the room, then load its recent history.
    ///
    /// Subscribing first means a message stored between the two steps shows
    /// up in both; the id set absorbs the duplicate.
    pub async fn join(transport: T, room_id: &str, identity: Option<Identity>) -> Result<Self, RelayError> {
        let subscription = transport.subscribe(room_id);
        let initial = transport.fetch_recent(room_id, INITIAL_FETCH_LIMIT).await?;

        let mut chat = Self {
            transport,
            room_id: room_id.to_owned(),
            identity,
            subscription,
            messages: Vec::with_capacity(initial.len()),
            seen: HashSet::new(),
            input: String::new(),
            gate: CooldownGate::default(),
            last_error: None,
        };
        for message in initial {
            chat.insert(message);
        }
        Ok(chat)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Last send failure worth showing, cleared by the next attempt that
    /// reaches the network.
    pub fn last_error(&self) -> Option<&SendError> {
        self.last_error.as_ref()
    }

    pub fn send_disabled(&self) -> bool {
        self.gate.check().is_err()
    }

    /// Whole seconds until sending is allowed again.
    pub fn cooldown_seconds(&self) -> u64 {
        self.gate.remaining_secs_at(Instant::now())
    }

    /// Add a message to the view. Returns `false` for a duplicate id or a
    /// message from another room.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if message.room_id != self.room_id || !self.seen.insert(message.id.clone()) {
            return false;
        }
        let pos = self.messages.partition_point(|m| {
            (m.created_at, m.id.as_str()) <= (message.created_at, message.id.as_str())
        });
        self.messages.insert(pos, message);
        true
    }

    pub fn apply(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Insert(message) => self.insert(message),
        }
    }

    /// Wait for the next feed event and apply it. `None` once the feed closes.
    pub async fn recv(&mut self) -> Option<bool> {
        let event = self.subscription.recv().await?;
        Some(self.apply(event))
    }

    /// Apply every queued event without waiting. Returns how many were new.
    pub fn try_drain(&mut self) -> usize {
        let mut added = 0;
        while let Some(event) = self.subscription.try_recv() {
            if self.apply(event) {
                added += 1;
            }
        }
        added
    }

    /// Send the current input.
    ///
    /// The input is cleared before the request goes out and is not restored
    /// on failure. A successful acknowledgment arms the local cooldown.
    pub async fn send(&mut self) -> Result<ChatMessage, SendError> {
        let text = self.input.trim().to_owned();
        if text.is_empty() {
            return Err(SendError::Empty);
        }
        let Some(identity) = self.identity.as_ref() else {
            return Err(self.fail(SendError::Unauthenticated));
        };
        if let Err(CoolingDown { remaining }) = self.gate.check() {
            return Err(self.fail(SendError::CoolingDown { remaining }));
        }

        let new = NewChatMessage {
            room_id: self.room_id.clone(),
            user_id: Some(identity.user_id.clone()),
            username: identity.display_name(),
            text,
        };
        self.input.clear();
        self.last_error = None;

        match self.transport.insert(new).await {
            Ok(stored) => {
                self.gate.arm();
                Ok(stored)
            }
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "live chat send failed");
                Err(self.fail(SendError::from(e)))
            }
        }
    }

    fn fail(&mut self, e: SendError) -> SendError {
        self.last_error = Some(e.clone());
        e
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
