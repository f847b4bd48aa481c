use utoipa::OpenApi;

use crate::routes::{health, rooms, sessions, summarize};

#[derive(OpenApi)]
#[openapi(info(
    title = "arena-server",
    description = "Live debate rooms, chat relay and debate summaries",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(summarize::SummarizeApi::openapi());
    root.merge(rooms::RoomsApi::openapi());
    root.merge(sessions::SessionsApi::openapi());
    root
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merged_document_lists_every_surface() {
        let doc = get_docs();
        for path in ["/health", "/summarize", "/rooms", "/rooms/{id}/messages", "/sessions/{id}"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
