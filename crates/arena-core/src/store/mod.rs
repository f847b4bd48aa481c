//! Persistence layer.
//!
//! One trait per table family. The default implementation is
//! [`sqlite::SqliteStore`]; to move to another database implement these
//! traits for a new type and change the concrete type the server holds.
//!
//! All trait methods use `impl Future` in their signatures, so no extra
//! `async-trait` crate is required here.

pub mod sqlite;

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{ChatMessage, DebateSession, Room, RoomStatus, Turn};

pub use sqlite::SqliteStore;

pub trait RoomStore: Send + Sync + 'static {
    fn create_room(&self, room: Room) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_room(&self, id: &str) -> impl Future<Output = Result<Option<Room>, sqlx::Error>> + Send;

    /// Every room, newest first. Visibility filtering is the caller's job.
    fn list_rooms(&self) -> impl Future<Output = Result<Vec<Room>, sqlx::Error>> + Send;

    /// Returns `false` when no room has this id.
    fn set_room_status(
        &self,
        id: &str,
        status: RoomStatus,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

pub trait MessageStore: Send + Sync + 'static {
    fn insert_message(&self, msg: ChatMessage) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// The `limit` most recent messages of a room, oldest first.
    fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, sqlx::Error>> + Send;

    /// Distinct senders per room since `since`, for the listed rooms only.
    fn participant_counts(
        &self,
        room_ids: &[String],
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<HashMap<String, usize>, sqlx::Error>> + Send;
}

pub trait DebateStore: Send + Sync + 'static {
    fn create_session(&self, session: DebateSession) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_session(&self, id: &str) -> impl Future<Output = Result<Option<DebateSession>, sqlx::Error>> + Send;

    fn append_turn(&self, turn: Turn) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Transcript in insertion order.
    fn list_turns(&self, session_id: &str) -> impl Future<Output = Result<Vec<Turn>, sqlx::Error>> + Send;

    fn save_summary(
        &self,
        session_id: &str,
        summary: &str,
        created_at: DateTime<Utc>,
        model: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// Fixed-width UTC timestamps so that string order is time order.
pub(crate) fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. A malformed value is a decode error, never a
/// substitute time.
pub(crate) fn from_db_time(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    raw.parse::<DateTime<Utc>>().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn from_db_time_opt(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    raw.map(from_db_time).transpose()
}
