use arena_core::directory::RoomView;
use arena_core::model::{ChatMessage, Room};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    /// Defaults to "Live debate battle" when blank.
    pub title: Option<String>,
    /// Defaults to 3000 seconds.
    pub duration_seconds: Option<i64>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomResponse {
    pub id: String,
    pub title: String,
    /// `"open"` or `"ended"`.
    pub status: String,
    pub created_by: Option<String>,
    pub duration_seconds: Option<i64>,
    pub ends_at: Option<String>,
    pub created_at: String,
}

impl From<Room> for RoomResponse {
    fn from(r: Room) -> Self {
        Self {
            id: r.id,
            title: r.title,
            status: r.status.to_string(),
            created_by: r.created_by,
            duration_seconds: r.duration_seconds,
            ends_at: r.ends_at.map(|t| t.to_rfc3339()),
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

/// One entry of `GET /rooms`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomListItem {
    pub id: String,
    pub title: String,
    pub status: String,
    pub ends_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub remaining_seconds: i64,
    pub presence_count: Option<usize>,
    pub participant_count: Option<usize>,
    pub viewer_count: usize,
    pub created_at: String,
}

impl From<RoomView> for RoomListItem {
    fn from(v: RoomView) -> Self {
        Self {
            id: v.id,
            title: v.title,
            status: v.status.to_string(),
            ends_at: v.ends_at.map(|t| t.to_rfc3339()),
            duration_seconds: v.duration_seconds,
            remaining_seconds: v.remaining_seconds,
            presence_count: v.presence_count,
            participant_count: v.participant_count,
            viewer_count: v.viewer_count,
            created_at: v.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    /// Required; a send without it is rejected with 401.
    pub user_id: Option<String>,
    /// Display name; "anonymous" when blank.
    #[serde(default)]
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub room_id: String,
    pub user_id: Option<String>,
    pub username: String,
    pub text: String,
    pub emoji: Option<String>,
    pub created_at: String,
}

impl From<ChatMessage> for MessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            room_id: m.room_id,
            user_id: m.user_id,
            username: m.username,
            text: m.text,
            emoji: m.emoji,
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

/// Query of `GET /rooms/{id}/live`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LiveQuery {
    /// Presence key, normally the user id. Anonymous viewers get
    /// `anon-<uuid>`.
    pub key: Option<String>,
}
