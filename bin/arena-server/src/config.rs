//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use arena_core::llm::NimSettings;
use arena_core::llm::nim::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use arena_core::summary::DEFAULT_LANGUAGE;

/// Runtime configuration for arena-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; summaries then fail until `NIM_API_KEY` is provided.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:$PORT"`, `PORT` defaults to 8080).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://arena.db"`).
    pub database_url: String,

    /// When set, session write routes require `Authorization: Bearer <key>`.
    pub service_role_key: Option<String>,

    pub nim_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint, without trailing `/`.
    pub nim_base_url: String,

    pub nim_model: String,

    /// Request timeout for the text-generation endpoint.
    pub llm_timeout: Duration,

    /// Output language requested from the summarizer.
    pub summary_language: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated allowed origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// Server-side per-user send throttle window.
    pub send_cooldown: Duration,

    /// Heartbeats older than this are swept from presence.
    pub presence_ttl: Duration,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let env_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());
        let parse_or = |key: &str, default: u64| -> u64 {
            get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };
        let flag_or = |key: &str, default: bool| {
            get(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };

        let port = parse_or("PORT", 8080);
        Self {
            bind_address: get("ARENA_BIND").unwrap_or_else(|| format!("0.0.0.0:{port}")),
            database_url: env_or("DATABASE_URL", "sqlite://arena.db"),
            service_role_key: get("SERVICE_ROLE_KEY"),
            nim_api_key: get("NIM_API_KEY"),
            nim_base_url: env_or("NIM_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_owned(),
            nim_model: env_or("NIM_MODEL", DEFAULT_MODEL),
            llm_timeout: Duration::from_secs(parse_or("ARENA_LLM_TIMEOUT_SECS", 60)),
            summary_language: env_or("ARENA_SUMMARY_LANGUAGE", DEFAULT_LANGUAGE),
            log_level: env_or("ARENA_LOG", "info"),
            log_json: flag_or("ARENA_LOG_JSON", false),
            cors_allowed_origins: get("ARENA_CORS_ORIGINS"),
            enable_swagger: flag_or("ARENA_ENABLE_SWAGGER", true),
            send_cooldown: Duration::from_millis(parse_or("ARENA_SEND_COOLDOWN_MS", 2000)),
            presence_ttl: Duration::from_secs(parse_or("ARENA_PRESENCE_TTL_SECS", 60).max(1)),
        }
    }

    pub fn nim_settings(&self) -> NimSettings {
        NimSettings {
            api_key: self.nim_api_key.clone(),
            base_url: self.nim_base_url.clone(),
            model: self.nim_model.clone(),
            timeout: self.llm_timeout,
        }
    }

    /// How often live connections refresh their heartbeat.
    pub fn presence_keepalive(&self) -> Duration {
        self.presence_ttl / 3
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
