//! Live rooms: the directory, the chat log and the live event streams.

use std::convert::Infallible;
use std::sync::Arc;

use arena_core::live::{LiveConnection, LiveEvent, LobbyConnection};
use arena_core::model::NewChatMessage;
use arena_core::presence::ConnectionKey;
use arena_core::store::RoomStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::Stream;
use tracing::{debug, warn};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::rooms::{
    CreateRoomRequest, LiveQuery, MessageResponse, RoomListItem, RoomResponse, SendMessageRequest,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_rooms, create_room, end_room, list_messages, send_message, room_live, lobby_live),
    components(schemas(
        CreateRoomRequest,
        RoomResponse,
        RoomListItem,
        SendMessageRequest,
        MessageResponse
    ))
)]
pub struct RoomsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms",               get(list_rooms).post(create_room))
        .route("/rooms/{id}/end",      post(end_room))
        .route("/rooms/{id}/messages", get(list_messages).post(send_message))
        .route("/rooms/{id}/live",     get(room_live))
        .route("/lobby/live",          get(lobby_live))
}

// ── Directory ─────────────────────────────────────────────────────────────────

/// Rooms that are open and not past their end time, newest first.
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses(
        (status = 200, description = "Visible rooms", body = Vec<RoomListItem>),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RoomListItem>>, ServerError> {
    let presence = state.presence.snapshot();
    let rooms = state.rooms.list_visible(Utc::now(), &presence).await?;
    Ok(Json(rooms.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room opened", body = RoomResponse),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<Json<RoomResponse>, ServerError> {
    let Json(req) = payload?;
    let room = state
        .rooms
        .create(req.title.as_deref(), req.duration_seconds, req.created_by)
        .await?;
    Ok(Json(room.into()))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/end",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Room ended", body = RoomResponse),
        (status = 404, description = "Room not found"),
    )
)]
pub async fn end_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoomResponse>, ServerError> {
    Ok(Json(state.rooms.end(&id).await?.into()))
}

// ── Chat log ──────────────────────────────────────────────────────────────────

/// The room's most recent messages, oldest first.
#[utoipa::path(
    get,
    path = "/rooms/{id}/messages",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Recent messages", body = Vec<MessageResponse>),
        (status = 404, description = "Room not found"),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ServerError> {
    let messages = state.relay.recent(&id).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Post a chat message. Stored, then pushed to every live subscriber.
#[utoipa::path(
    post,
    path = "/rooms/{id}/messages",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message stored", body = MessageResponse),
        (status = 400, description = "Empty, too long, or the room has ended"),
        (status = 401, description = "No user id"),
        (status = 404, description = "Room not found"),
        (status = 429, description = "Sender is cooling down"),
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ServerError> {
    let Json(req) = payload?;
    let message = state
        .relay
        .post(NewChatMessage {
            room_id: id,
            user_id: req.user_id,
            username: req.username,
            text: req.text,
        })
        .await?;
    Ok(Json(message.into()))
}

// ── Live streams ──────────────────────────────────────────────────────────────

/// Server-sent events for one room: `message` for each new chat message and
/// `presence` whenever the viewer count changes.
///
/// Opening the stream counts the caller as a viewer until it disconnects.
#[utoipa::path(
    get,
    path = "/rooms/{id}/live",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id"), LiveQuery),
    responses(
        (status = 200, description = "Event stream", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Room has ended"),
        (status = 404, description = "Room not found"),
    )
)]
pub async fn room_live(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LiveQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let room = state
        .store
        .get_room(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("room {id}")))?;
    if !room.is_visible_at(Utc::now()) {
        return Err(ServerError::BadRequest("room has ended".into()));
    }

    let key = ConnectionKey::for_user(query.key.as_deref());
    debug!(room_id = %room.id, key = %key, "live stream opened");
    let conn = LiveConnection::open(
        state.relay.feed(),
        &state.presence,
        &room.id,
        key,
        state.config.presence_keepalive(),
    );

    let stream = futures::stream::unfold(conn, |mut conn| async move {
        let event = conn.next().await?;
        Some((Ok::<_, Infallible>(to_sse(&event)), conn))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Server-sent `presence` events for every room visible when the stream
/// opened. The lobby itself is tracked under the shared lobby key.
#[utoipa::path(
    get,
    path = "/lobby/live",
    tag = "rooms",
    responses(
        (status = 200, description = "Event stream", body = String, content_type = "text/event-stream"),
    )
)]
pub async fn lobby_live(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let rooms = state.rooms.list_visible(Utc::now(), &state.presence.snapshot()).await?;
    let conn = LobbyConnection::open(
        &state.presence,
        rooms.into_iter().map(|r| r.id).collect(),
        state.config.presence_keepalive(),
    );

    let stream = futures::stream::unfold(conn, |mut conn| async move {
        let event = conn.next().await?;
        Some((Ok::<_, Infallible>(to_sse(&event)), conn))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &LiveEvent) -> Event {
    Event::default().event(event.kind()).json_data(event).unwrap_or_else(|e| {
        warn!(error = %e, kind = event.kind(), "failed to encode live event");
        Event::default().comment("encode error")
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use arena_core::model::ChatMessage;

    #[test]
    fn sse_event_is_named_after_its_kind() {
        let event = LiveEvent::Presence { room_id: "r1".into(), count: 2 };
        let rendered = format!("{:?}", to_sse(&event));
        assert!(rendered.contains("presence"));

        let message = LiveEvent::Message(ChatMessage {
            id: "m1".into(),
            room_id: "r1".into(),
            user_id: Some("u1".into()),
            username: "kim".into(),
            text: "hi".into(),
            emoji: None,
            created_at: Utc::now(),
        });
        assert!(format!("{:?}", to_sse(&message)).contains("message"));
    }
}
