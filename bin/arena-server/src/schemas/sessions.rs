use arena_core::model::{DebateSession, Turn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub topic: Option<String>,
    pub lecture_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppendTurnRequest {
    /// Author role or name.
    pub sender: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TurnResponse {
    pub id: String,
    pub session_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: String,
}

impl From<Turn> for TurnResponse {
    fn from(t: Turn) -> Self {
        Self {
            id: t.id,
            session_id: t.session_id,
            sender: t.sender,
            content: t.content,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    pub user_id: String,
    pub topic: Option<String>,
    pub lecture_title: Option<String>,
    pub summary: Option<String>,
    pub summary_created_at: Option<String>,
    pub summary_model: Option<String>,
    pub created_at: String,
    /// Transcript in order; empty on create.
    pub turns: Vec<TurnResponse>,
}

impl SessionResponse {
    pub fn new(s: DebateSession, turns: Vec<Turn>) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            topic: s.topic,
            lecture_title: s.lecture_title,
            summary: s.summary,
            summary_created_at: s.summary_created_at.map(|t| t.to_rfc3339()),
            summary_model: s.summary_model,
            created_at: s.created_at.to_rfc3339(),
            turns: turns.into_iter().map(Into::into).collect(),
        }
    }
}
