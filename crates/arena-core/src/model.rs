//! Rows shared by the relay, presence and summary components.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Display name used when a sender has nothing better to show.
pub const ANONYMOUS: &str = "anonymous";

/// Default lifetime of a freshly created room.
pub const DEFAULT_ROOM_DURATION_SECS: i64 = 3000;

/// Longest lifetime a room may be opened with (one week).
pub const MAX_ROOM_DURATION_SECS: i64 = 7 * 24 * 60 * 60;

/// Lifecycle of a live room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoomStatus {
    Open,
    Ended,
}

/// A row in the `live_rooms` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub title: String,
    pub status: RoomStatus,
    pub created_by: Option<String>,
    pub duration_seconds: Option<i64>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Build an open room that expires `duration_seconds` after `now`.
    ///
    /// A duration past chrono's range leaves `ends_at` unset; callers bound
    /// it with [`MAX_ROOM_DURATION_SECS`] first.
    pub fn open(
        title: impl Into<String>,
        duration_seconds: Option<i64>,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let duration = duration_seconds.unwrap_or(DEFAULT_ROOM_DURATION_SECS);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            status: RoomStatus::Open,
            created_by,
            duration_seconds: Some(duration),
            ends_at: Duration::try_seconds(duration).and_then(|d| now.checked_add_signed(d)),
            created_at: now,
        }
    }

    /// Whether new joiners may still see this room at `now`.
    ///
    /// A room disappears once it is ended *or* once its expiry has passed,
    /// whichever comes first; the status column is not required to catch up.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        if self.status == RoomStatus::Ended {
            return false;
        }
        match self.ends_at {
            Some(ends_at) => ends_at > now,
            None => true,
        }
    }

    /// Whole seconds left before expiry (rounded up), or the fixed duration
    /// for rooms without an expiry instant.
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        match self.ends_at {
            Some(ends_at) => {
                let millis = (ends_at - now).num_milliseconds().max(0);
                (millis + 999) / 1000
            }
            None => self.duration_seconds.unwrap_or(DEFAULT_ROOM_DURATION_SECS),
        }
    }
}

/// A row in the append-only `live_chat_messages` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Author display name.
    pub username: String,
    pub text: String,
    /// Optional reaction tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The fields a sender supplies; the relay assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub room_id: String,
    pub user_id: Option<String>,
    pub username: String,
    pub text: String,
}

/// Profile fields a display name can be resolved from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    /// First non-blank of full name, name, username and e-mail local part.
    pub fn display_name(&self) -> String {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        non_blank(&self.full_name)
            .or_else(|| non_blank(&self.name))
            .or_else(|| non_blank(&self.username))
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| ANONYMOUS.to_owned())
    }
}

/// An authenticated chat participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub profile: UserProfile,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, profile: UserProfile) -> Self {
        Self { user_id: user_id.into(), profile }
    }

    pub fn display_name(&self) -> String {
        self.profile.display_name()
    }
}

/// A row in the `debate_sessions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DebateSession {
    pub id: String,
    pub user_id: String,
    pub topic: Option<String>,
    pub lecture_title: Option<String>,
    pub summary: Option<String>,
    pub summary_created_at: Option<DateTime<Utc>>,
    pub summary_model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(
        user_id: impl Into<String>,
        topic: Option<String>,
        lecture_title: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            topic,
            lecture_title,
            summary: None,
            summary_created_at: None,
            summary_model: None,
            created_at: now,
        }
    }

    /// Topic shown to the summarizer: topic, then lecture title, then a
    /// generic label.
    pub fn topic_label(&self) -> &str {
        self.topic
            .as_deref()
            .or(self.lecture_title.as_deref())
            .unwrap_or("free debate")
    }
}

/// One transcript turn, a row in `debate_messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    /// Author role or name, e.g. `"user"`, `"james"`.
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        session_id: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            sender: sender.into(),
            content: content.into(),
            created_at: now,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
