//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use arena_core::directory::RoomDirectory;
use arena_core::feed::MessageFeed;
use arena_core::llm::TextGenerator;
use arena_core::presence::PresenceHub;
use arena_core::relay::Relay;
use arena_core::store::SqliteStore;
use arena_core::summary::SummaryWorker;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Rooms, chat log and debate sessions.
    pub store: Arc<SqliteStore>,
    /// The shared presence channel.
    pub presence: PresenceHub,
    pub relay: Relay<SqliteStore>,
    pub rooms: RoomDirectory<SqliteStore>,
    pub summaries: SummaryWorker<SqliteStore>,
}

impl AppState {
    /// Wire every component around one store and one text generator.
    pub fn new(config: Config, store: SqliteStore, generator: Arc<dyn TextGenerator>) -> Self {
        let store = Arc::new(store);
        let relay = Relay::with_cooldown(Arc::clone(&store), MessageFeed::default(), config.send_cooldown);
        let summaries = SummaryWorker::new(Arc::clone(&store), generator)
            .with_language(config.summary_language.clone());
        Self {
            rooms: RoomDirectory::new(Arc::clone(&store)),
            presence: PresenceHub::default(),
            config: Arc::new(config),
            store,
            relay,
            summaries,
        }
    }
}
