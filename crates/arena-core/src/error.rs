//! Error types for the relay, the chat client and the summary worker.

use std::time::Duration;

use thiserror::Error;

use crate::llm::GenerationError;

/// Failures of the relay and the room directory.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Empty, oversized or otherwise unacceptable input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The sender carried no user id.
    #[error("sign in to send messages")]
    Unauthenticated,

    /// The referenced room does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The authoritative per-user throttle rejected the send.
    #[error("rate_limit: retry in {} ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// Propagated from the message store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a failed [`crate::chat::LiveChat::send`].
///
/// Each variant decides what happens to the input field and the local
/// cooldown; see [`SendError::user_message`] for the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Nothing but whitespace in the input field; nothing is sent.
    #[error("message is empty")]
    Empty,

    /// No signed-in user. The input is kept.
    #[error("not signed in")]
    Unauthenticated,

    /// The local cooldown is still running; the network was not touched.
    #[error("cooling down for another {} ms", remaining.as_millis())]
    CoolingDown { remaining: Duration },

    /// The server throttled the send.
    #[error("rate limited by server")]
    RateLimited,

    /// Anything else. The optimistic input clear is not undone.
    #[error("send failed: {0}")]
    Unknown(String),
}

impl SendError {
    /// User-facing message for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            SendError::Empty => "",
            SendError::Unauthenticated => "Please sign in to join the chat.",
            SendError::CoolingDown { .. } | SendError::RateLimited => {
                "Please wait a moment before sending again."
            }
            SendError::Unknown(_) => "Failed to send the message.",
        }
    }
}

impl From<RelayError> for SendError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Unauthenticated => SendError::Unauthenticated,
            RelayError::RateLimited { .. } => SendError::RateLimited,
            other => SendError::Unknown(other.to_string()),
        }
    }
}

/// All errors the summary worker can return.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Missing session id, or a transcript with nothing to summarize.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The referenced session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Loading the session or its transcript failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The text-generation endpoint failed or produced nothing.
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relay_rate_limit_maps_to_send_rate_limit() {
        let e = RelayError::RateLimited { retry_after: Duration::from_millis(1500) };
        assert!(e.to_string().contains("rate_limit"));
        assert_eq!(SendError::from(e), SendError::RateLimited);
    }

    #[test]
    fn relay_failures_other_than_auth_and_throttle_are_unknown() {
        let e = SendError::from(RelayError::NotFound("room r1".into()));
        assert!(matches!(e, SendError::Unknown(ref m) if m.contains("room r1")));
        assert_eq!(e.user_message(), "Failed to send the message.");
    }

    #[test]
    fn cooldown_and_server_throttle_share_the_wait_message() {
        let local = SendError::CoolingDown { remaining: Duration::from_secs(1) };
        assert_eq!(local.user_message(), SendError::RateLimited.user_message());
    }
}
