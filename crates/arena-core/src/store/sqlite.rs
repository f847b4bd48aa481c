//! SQLite implementation of the store traits.
//!
//! Uses [`sqlx`] with the `sqlite` feature. Migrations run automatically on
//! startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path **at compile time**
//! relative to this crate's `CARGO_MANIFEST_DIR`, so the SQL is embedded into
//! the binary. The database location comes from `DATABASE_URL` at runtime.
//!
//! # Queries
//!
//! The runtime-checked `sqlx::query` form is used so that no `DATABASE_URL`
//! is needed at compile time. Timestamps are stored as fixed-width RFC 3339
//! text (see [`super::to_db_time`]); ties are broken by `rowid`, which
//! follows insertion order.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::{DebateStore, MessageStore, RoomStore, from_db_time, from_db_time_opt, to_db_time};
use crate::model::{ChatMessage, DebateSession, Room, RoomStatus, Turn};

type RoomRow = (String, String, String, Option<String>, Option<i64>, Option<String>, String);
type MessageRow = (String, String, Option<String>, String, String, Option<String>, String);
type SessionRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

/// SQLite-backed store for rooms, chat messages and debate sessions.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `"sqlite://arena.db"`, or
    /// `"sqlite::memory:"` for tests. An in-memory database lives in a single
    /// connection that the pool never recycles.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    /// Round-trip a trivial query; used by the health check.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn room_from_row(
    (id, title, status, created_by, duration_seconds, ends_at, created_at): RoomRow,
) -> Result<Room, sqlx::Error> {
    let status = RoomStatus::from_str(&status).unwrap_or_else(|_| {
        tracing::warn!(room_id = %id, raw = %status, "unknown room status; treating as ended");
        RoomStatus::Ended
    });
    Ok(Room {
        id,
        title,
        status,
        created_by,
        duration_seconds,
        ends_at: from_db_time_opt(ends_at.as_deref())?,
        created_at: from_db_time(&created_at)?,
    })
}

fn message_from_row(
    (id, room_id, user_id, username, text, emoji, created_at): MessageRow,
) -> Result<ChatMessage, sqlx::Error> {
    Ok(ChatMessage {
        id,
        room_id,
        user_id,
        username,
        text,
        emoji,
        created_at: from_db_time(&created_at)?,
    })
}

// ── RoomStore ─────────────────────────────────────────────────────────────────

impl RoomStore for SqliteStore {
    async fn create_room(&self, room: Room) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO live_rooms (id, title, status, created_by, duration_seconds, ends_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&room.id)
        .bind(&room.title)
        .bind(room.status.to_string())
        .bind(&room.created_by)
        .bind(room.duration_seconds)
        .bind(room.ends_at.map(to_db_time))
        .bind(to_db_time(room.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_room(&self, id: &str) -> Result<Option<Room>, sqlx::Error> {
        let row: Option<RoomRow> = sqlx::query_as(
            "SELECT id, title, status, created_by, duration_seconds, ends_at, created_at \
             FROM live_rooms WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(room_from_row).transpose()
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, sqlx::Error> {
        let rows: Vec<RoomRow> = sqlx::query_as(
            "SELECT id, title, status, created_by, duration_seconds, ends_at, created_at \
             FROM live_rooms ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(room_from_row).collect()
    }

    async fn set_room_status(&self, id: &str, status: RoomStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE live_rooms SET status = ?1 WHERE id = ?2")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── MessageStore ──────────────────────────────────────────────────────────────

impl MessageStore for SqliteStore {
    async fn insert_message(&self, msg: ChatMessage) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO live_chat_messages (id, room_id, user_id, username, text, emoji, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&msg.id)
        .bind(&msg.room_id)
        .bind(&msg.user_id)
        .bind(&msg.username)
        .bind(&msg.text)
        .bind(&msg.emoji)
        .bind(to_db_time(msg.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<(String, String, Option<String>, String, String, Option<String>, String, i64)> =
            sqlx::query_as(
                "SELECT id, room_id, user_id, username, text, emoji, created_at, seq FROM ( \
                     SELECT id, room_id, user_id, username, text, emoji, created_at, rowid AS seq \
                     FROM live_chat_messages WHERE room_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 \
                 ) ORDER BY created_at ASC, seq ASC",
            )
            .bind(room_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(id, room_id, user_id, username, text, emoji, created_at, _seq)| {
                message_from_row((id, room_id, user_id, username, text, emoji, created_at))
            })
            .collect()
    }

    async fn participant_counts(
        &self,
        room_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, sqlx::Error> {
        if room_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT room_id, COUNT(DISTINCT COALESCE(user_id, username)) \
             FROM live_chat_messages WHERE created_at >= ",
        );
        qb.push_bind(to_db_time(since));
        qb.push(" AND room_id IN (");
        let mut ids = qb.separated(", ");
        for id in room_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(") GROUP BY room_id");

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(room_id, n)| (room_id, n.max(0) as usize))
            .collect())
    }
}

// ── DebateStore ───────────────────────────────────────────────────────────────

impl DebateStore for SqliteStore {
    async fn create_session(&self, session: DebateSession) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO debate_sessions \
             (id, user_id, topic, lecture_title, summary, summary_created_at, summary_model, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.topic)
        .bind(&session.lecture_title)
        .bind(&session.summary)
        .bind(session.summary_created_at.map(to_db_time))
        .bind(&session.summary_model)
        .bind(to_db_time(session.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<DebateSession>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, topic, lecture_title, summary, summary_created_at, summary_model, created_at \
             FROM debate_sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(
            |(id, user_id, topic, lecture_title, summary, summary_created_at, summary_model, created_at)|
             -> Result<DebateSession, sqlx::Error> {
                Ok(DebateSession {
                    id,
                    user_id,
                    topic,
                    lecture_title,
                    summary,
                    summary_created_at: from_db_time_opt(summary_created_at.as_deref())?,
                    summary_model,
                    created_at: from_db_time(&created_at)?,
                })
            },
        )
        .transpose()
    }

    async fn append_turn(&self, turn: Turn) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO debate_messages (id, session_id, sender, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&turn.id)
        .bind(&turn.session_id)
        .bind(&turn.sender)
        .bind(&turn.content)
        .bind(to_db_time(turn.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>, sqlx::Error> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, session_id, sender, content, created_at \
             FROM debate_messages WHERE session_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, session_id, sender, content, created_at)| -> Result<Turn, sqlx::Error> {
                Ok(Turn {
                    id,
                    session_id,
                    sender,
                    content,
                    created_at: from_db_time(&created_at)?,
                })
            })
            .collect()
    }

    async fn save_summary(
        &self,
        session_id: &str,
        summary: &str,
        created_at: DateTime<Utc>,
        model: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE debate_sessions SET summary = ?1, summary_created_at = ?2, summary_model = ?3 \
             WHERE id = ?4",
        )
        .bind(summary)
        .bind(to_db_time(created_at))
        .bind(model)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
