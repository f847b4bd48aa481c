use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /summarize`. An empty body counts as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SummarizeRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SummarizeResponse {
    pub summary: String,
}
