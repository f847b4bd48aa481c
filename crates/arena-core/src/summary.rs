//! Transcript → summary worker.
//!
//! Loads a debate session and its ordered transcript, asks the configured
//! [`TextGenerator`] for a structured summary and writes it back onto the
//! session row. The worker holds no per-session state; two concurrent calls
//! for the same session both generate and the last write wins.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{error, info};

use crate::error::SummaryError;
use crate::llm::{CompletionRequest, PromptMessage, TextGenerator};
use crate::model::{DebateSession, Turn};
use crate::store::DebateStore;

pub const DEFAULT_LANGUAGE: &str = "Korean";
pub const SUMMARY_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_MAX_TOKENS: u32 = 500;

/// A generated summary as returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// `false` when the text was generated but writing it back failed.
    pub persisted: bool,
}

pub struct SummaryWorker<S> {
    store: Arc<S>,
    generator: Arc<dyn TextGenerator>,
    language: String,
}

impl<S> Clone for SummaryWorker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            language: self.language.clone(),
        }
    }
}

impl<S: DebateStore> SummaryWorker<S> {
    pub fn new(store: Arc<S>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { store, generator, language: DEFAULT_LANGUAGE.into() }
    }

    /// Output language named in the system instruction.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Summarize the session and persist the result.
    pub async fn summarize(&self, session_id: Option<&str>) -> Result<Summary, SummaryError> {
        let session_id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SummaryError::BadRequest("session_id is required".into()))?;

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| SummaryError::NotFound(format!("session {session_id}")))?;

        let turns = self.store.list_turns(session_id).await?;
        let transcript = render_transcript(&turns);
        if transcript.is_empty() {
            return Err(SummaryError::BadRequest("nothing to summarize".into()));
        }

        let request = CompletionRequest {
            messages: build_prompt(&session, &transcript, &self.language),
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: SUMMARY_MAX_TOKENS,
        };
        let text = self.generator.complete(request).await?;
        let model = self.generator.model().to_owned();
        let created_at = next_summary_time(Utc::now().trunc_subsecs(6), session.summary_created_at);

        let persisted = match self
            .store
            .save_summary(session_id, &text, created_at, &model)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "failed to persist summary");
                false
            }
        };
        info!(session_id = %session_id, model = %model, turns = turns.len(), persisted, "summary generated");

        Ok(Summary { text, model, created_at, persisted })
    }
}

/// `"<sender>: <content>"` per turn, joined by newlines.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.sender, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(session: &DebateSession, transcript: &str, language: &str) -> Vec<PromptMessage> {
    let system = [
        "You are an assistant that summarizes debates.".to_owned(),
        format!("Write the output in {language} as a concise, structured summary."),
        "Format: key claims (2-4 lines), evidence and rebuttals (bullet points), conclusion or next action (1 line)."
            .to_owned(),
    ]
    .join("\n");
    let user = format!(
        "Debate topic: {}\nTranscript:\n{transcript}",
        session.topic_label()
    );
    vec![PromptMessage::system(system), PromptMessage::user(user)]
}

/// Stored summary timestamps never repeat or go backwards for one session.
fn next_summary_time(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::llm::GenerationError;
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct Scripted {
        reply: Result<String, u16>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(text.into()), seen: Mutex::new(Vec::new()) })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self { reply: Err(status), seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
            self.seen.lock().expect("lock").push(request);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(GenerationError::Status { status: *status, body: "boom".into() }),
            }
        }
    }

    async fn seeded(topic: Option<&str>) -> (Arc<SqliteStore>, DebateSession) {
        let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
        let now = Utc::now();
        let session = DebateSession::new("u1", topic.map(str::to_owned), None, now);
        store.create_session(session.clone()).await.expect("session");
        store
            .append_turn(Turn::new(&session.id, "Alice", "AI should be regulated", now))
            .await
            .expect("turn");
        store
            .append_turn(Turn::new(&session.id, "Bob", "Regulation stifles innovation", now))
            .await
            .expect("turn");
        (store, session)
    }

    #[tokio::test]
    async fn summarizes_and_persists() {
        let (store, session) = seeded(Some("AI regulation")).await;
        let generator = Scripted::replying("Both sides agree AI matters.");
        let worker = SummaryWorker::new(Arc::clone(&store), generator.clone());

        let summary = worker.summarize(Some(&session.id)).await.expect("summary");
        assert_eq!(summary.text, "Both sides agree AI matters.");
        assert_eq!(summary.model, "scripted-model");
        assert!(summary.persisted);

        let stored = store.get_session(&session.id).await.expect("query").expect("exists");
        assert_eq!(stored.summary.as_deref(), Some("Both sides agree AI matters."));
        assert_eq!(stored.summary_model.as_deref(), Some("scripted-model"));
        assert!(stored.summary_created_at.is_some());

        let seen = generator.seen.lock().expect("lock");
        let request = &seen[0];
        assert_eq!(request.temperature, SUMMARY_TEMPERATURE);
        assert_eq!(request.max_tokens, SUMMARY_MAX_TOKENS);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[0].content.contains("Korean"));
        assert_eq!(
            request.messages[1].content,
            "Debate topic: AI regulation\nTranscript:\n\
             Alice: AI should be regulated\nBob: Regulation stifles innovation"
        );
    }

    #[tokio::test]
    async fn rerun_overwrites_and_advances_timestamp() {
        let (store, session) = seeded(None).await;
        let worker = SummaryWorker::new(Arc::clone(&store), Scripted::replying("first"));
        let first = worker.summarize(Some(&session.id)).await.expect("first");

        let worker = SummaryWorker::new(Arc::clone(&store), Scripted::replying("second"));
        let second = worker.summarize(Some(&session.id)).await.expect("second");
        assert!(second.created_at > first.created_at);

        let stored = store.get_session(&session.id).await.expect("query").expect("exists");
        assert_eq!(stored.summary.as_deref(), Some("second"));
        assert_eq!(stored.summary_created_at, Some(second.created_at));
    }

    #[tokio::test]
    async fn missing_or_blank_id_is_bad_request() {
        let (store, _) = seeded(None).await;
        let worker = SummaryWorker::new(store, Scripted::replying("x"));
        assert!(matches!(worker.summarize(None).await, Err(SummaryError::BadRequest(_))));
        assert!(matches!(worker.summarize(Some("  ")).await, Err(SummaryError::BadRequest(_))));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (store, _) = seeded(None).await;
        let generator = Scripted::replying("x");
        let worker = SummaryWorker::new(store, generator.clone());
        assert!(matches!(worker.summarize(Some("missing")).await, Err(SummaryError::NotFound(_))));
        assert!(generator.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn empty_transcript_is_bad_request() {
        let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
        let session = DebateSession::new("u1", None, None, Utc::now());
        store.create_session(session.clone()).await.expect("session");
        let worker = SummaryWorker::new(store, Scripted::replying("x"));
        assert!(matches!(
            worker.summarize(Some(&session.id)).await,
            Err(SummaryError::BadRequest(m)) if m == "nothing to summarize"
        ));
    }

    #[tokio::test]
    async fn upstream_failure_leaves_session_untouched() {
        let (store, session) = seeded(None).await;
        let worker = SummaryWorker::new(Arc::clone(&store), Scripted::failing(502));
        assert!(matches!(
            worker.summarize(Some(&session.id)).await,
            Err(SummaryError::Generation(GenerationError::Status { status: 502, .. }))
        ));
        let stored = store.get_session(&session.id).await.expect("query").expect("exists");
        assert!(stored.summary.is_none());
    }

    /// Reads succeed, the summary write always fails.
    struct ReadOnly(SqliteStore);

    impl DebateStore for ReadOnly {
        async fn create_session(&self, session: DebateSession) -> Result<(), sqlx::Error> {
            self.0.create_session(session).await
        }
        async fn get_session(&self, id: &str) -> Result<Option<DebateSession>, sqlx::Error> {
            self.0.get_session(id).await
        }
        async fn append_turn(&self, turn: Turn) -> Result<(), sqlx::Error> {
            self.0.append_turn(turn).await
        }
        async fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>, sqlx::Error> {
            self.0.list_turns(session_id).await
        }
        async fn save_summary(
            &self,
            _session_id: &str,
            _summary: &str,
            _created_at: DateTime<Utc>,
            _model: &str,
        ) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn persist_failure_is_logged_and_reported() {
        let (store, session) = seeded(None).await;
        let store = Arc::new(ReadOnly((*store).clone()));
        let worker = SummaryWorker::new(store, Scripted::replying("text"));

        let summary = worker.summarize(Some(&session.id)).await.expect("summary");
        assert_eq!(summary.text, "text");
        assert!(!summary.persisted);
        assert!(logs_contain("failed to persist summary"));
    }

    #[test]
    fn summary_time_strictly_advances() {
        let t = Utc::now();
        assert_eq!(next_summary_time(t, None), t);
        assert_eq!(next_summary_time(t, Some(t)), t + Duration::milliseconds(1));
        let later = t + Duration::seconds(5);
        assert_eq!(next_summary_time(t, Some(later)), later + Duration::milliseconds(1));
        assert_eq!(next_summary_time(later, Some(t)), later);
    }

    #[test]
    fn topic_falls_back_to_free_debate() {
        let session = DebateSession::new("u1", None, None, Utc::now());
        let prompt = build_prompt(&session, "a: b", "English");
        assert!(prompt[0].content.contains("English"));
        assert!(prompt[1].content.starts_with("Debate topic: free debate\n"));
    }
}
