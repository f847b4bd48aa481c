//! arena-core – live-room presence, chat relay and debate summaries.
//!
//! Module map:
//! - [`model`]    rows shared by every component (rooms, chat messages, sessions)
//! - [`cooldown`] the per-sender send throttle
//! - [`presence`] heartbeat aggregation on the shared presence channel
//! - [`feed`]     per-room insertion notifications
//! - [`relay`]    validated appends to the chat log, fanned out through the feed
//! - [`chat`]     a client's local, ordered, de-duplicated view of a room
//! - [`directory`] room creation, ending and the lobby listing
//! - [`live`]     one server-side connection multiplexing feed and presence
//! - [`llm`]      the OpenAI-compatible text-generation client
//! - [`summary`]  transcript → summary worker
//! - [`store`]    persistence traits and the SQLite implementation

pub mod chat;
pub mod cooldown;
pub mod directory;
pub mod error;
pub mod feed;
pub mod live;
pub mod llm;
pub mod model;
pub mod presence;
pub mod relay;
pub mod store;
pub mod summary;

pub use error::{RelayError, SendError, SummaryError};
