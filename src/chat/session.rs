//! Chat session management.
//!
//! A [`ChatSession`] owns the transcript and the session configuration. It
//! is the only place either is mutated: user turns are appended before a
//! completion starts, assistant turns only after one finishes cleanly.

use crate::chat::config::{ConfigUpdate, SessionConfig};
use crate::client::CompletionBackend;
use crate::observability::{
    SESSION_REJECTED_SUBMISSIONS, SESSION_TURNS_COMMITTED, SESSION_TURNS_DISCARDED,
};
use crate::reducer::{CompletionOutcome, CompletionReducer, CompletionState};
use crate::render::Renderer;
use crate::types::{ChatCompletionRequest, Model, Turn};
use crate::{Error, Result};

/// Assistant text starting with this marker is never committed.
pub const ERROR_MARKER: &str = "Error:";

/// Statistics about the current chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The number of turns in the transcript.
    pub message_count: usize,
    /// The sampling temperature.
    pub temperature: f32,
    /// The maximum tokens per response.
    pub max_tokens: u32,
    /// Whether an API key is configured.
    pub has_credential: bool,
    /// Requests sent since the session started.
    pub requests: u64,
    /// Requests that produced a complete response.
    pub completed: u64,
    /// Requests that failed or were interrupted.
    pub failed: u64,
}

/// Marks a request as outstanding until dropped.
///
/// Dropping the submission future part-way still clears the flag.
struct InFlightGuard<'a>(&'a mut bool);

impl<'a> InFlightGuard<'a> {
    fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// A chat session that manages conversation state and API interactions.
pub struct ChatSession<B: CompletionBackend> {
    backend: B,
    config: SessionConfig,
    transcript: Vec<Turn>,
    reducer: CompletionReducer,
    request_in_flight: bool,
    requests: u64,
    completed: u64,
    failed: u64,
}

impl<B: CompletionBackend> ChatSession<B> {
    /// Creates a new chat session with an empty transcript.
    pub fn new(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            transcript: Vec::new(),
            reducer: CompletionReducer::new(),
            request_in_flight: false,
            requests: 0,
            completed: 0,
            failed: 0,
        }
    }

    /// Submits a user message and streams the assistant's reply.
    ///
    /// The user turn is appended before the request goes out and stays even
    /// if the completion fails. The assistant turn is appended only when the
    /// stream finishes cleanly. Fragments are reported to `observer` as they
    /// arrive.
    ///
    /// Nothing is sent and nothing changes when the message is blank, no
    /// credential is configured, or another request is outstanding.
    pub async fn append_user_turn(
        &mut self,
        text: &str,
        observer: &mut dyn Renderer,
    ) -> Result<()> {
        if self.request_in_flight {
            SESSION_REJECTED_SUBMISSIONS.click();
            return Err(Error::RequestInFlight);
        }
        if text.trim().is_empty() {
            SESSION_REJECTED_SUBMISSIONS.click();
            return Err(Error::validation("message is empty", Some("text".to_string())));
        }
        if !self.config.has_credential() {
            SESSION_REJECTED_SUBMISSIONS.click();
            return Err(Error::MissingCredential);
        }

        self.transcript.push(Turn::user(text));
        let request = self.build_request();
        let credential = self.config.credential.clone();
        self.requests += 1;

        let outcome = {
            let _guard = InFlightGuard::new(&mut self.request_in_flight);
            self.reducer
                .reduce(&self.backend, &credential, request, observer)
                .await
        };
        self.reducer.reset();

        match outcome {
            CompletionOutcome::Completed(text) => {
                self.completed += 1;
                if !self.commit_assistant_turn(&text) {
                    SESSION_TURNS_DISCARDED.click();
                }
                Ok(())
            }
            CompletionOutcome::Failed(err) => {
                self.failed += 1;
                SESSION_TURNS_DISCARDED.click();
                Err(err)
            }
        }
    }

    /// Appends an assistant turn.
    ///
    /// Empty text and text beginning with [`ERROR_MARKER`] are refused.
    /// Returns whether the turn was appended.
    pub fn commit_assistant_turn(&mut self, text: &str) -> bool {
        if text.is_empty() || text.starts_with(ERROR_MARKER) {
            return false;
        }
        self.transcript.push(Turn::assistant(text));
        SESSION_TURNS_COMMITTED.click();
        true
    }

    /// Clears the transcript. The configuration is untouched.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Merges `update` into the configuration.
    ///
    /// Values are stored as given; callers clamp them first.
    pub fn update_configuration(&mut self, update: ConfigUpdate) {
        self.config.apply(update);
    }

    /// Builds the request for the current transcript and configuration.
    pub fn build_request(&self) -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            self.config.model.clone(),
            &self.transcript,
            self.config.temperature,
            self.config.max_tokens,
        )
    }

    /// The turns so far, oldest first.
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// The settings the next request is built from.
    pub fn configuration(&self) -> &SessionConfig {
        &self.config
    }

    /// True while a submission is awaiting its completion.
    pub fn is_request_in_flight(&self) -> bool {
        self.request_in_flight
    }

    /// The completion reducer's state; `Idle` between submissions.
    pub fn state(&self) -> CompletionState {
        self.reducer.state()
    }

    /// Returns statistics about the current session.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.config.model.clone(),
            message_count: self.transcript.len(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            has_credential: self.config.has_credential(),
            requests: self.requests,
            completed: self.completed,
            failed: self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::FutureExt;
    use futures::stream;

    use super::*;
    use crate::client::ChunkStream;
    use crate::types::{ChatCompletionChunk, Credential, Role};

    #[derive(Default)]
    struct Recorder {
        previews: Vec<String>,
        completed: Vec<String>,
        errors: usize,
        interrupted: bool,
        interrupt_after: Option<usize>,
    }

    impl Renderer for Recorder {
        fn on_fragment(&mut self, preview: &str) {
            self.previews.push(preview.to_string());
        }

        fn on_complete(&mut self, text: &str) {
            self.completed.push(text.to_string());
        }

        fn on_error(&mut self, _: &Error) {
            self.errors += 1;
        }

        fn on_interrupted(&mut self) {
            self.interrupted = true;
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}

        fn should_interrupt(&self) -> bool {
            self.interrupt_after
                .is_some_and(|limit| self.previews.len() >= limit)
        }
    }

    #[derive(Clone)]
    enum Reply {
        Text(Vec<&'static str>),
        FailAfter(Vec<&'static str>),
        Reject,
        Hang,
    }

    #[derive(Clone)]
    struct ScriptedBackend {
        reply: Reply,
        requests: Arc<Mutex<Vec<(String, ChatCompletionRequest)>>>,
    }

    impl ScriptedBackend {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn sent(&self) -> Vec<(String, ChatCompletionRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn stream(
            &self,
            credential: &Credential,
            request: ChatCompletionRequest,
        ) -> Result<ChunkStream> {
            self.requests
                .lock()
                .unwrap()
                .push((credential.expose().to_string(), request));
            match &self.reply {
                Reply::Text(fragments) => Ok(Box::pin(stream::iter(text_chunks(fragments)))),
                Reply::FailAfter(fragments) => {
                    let mut items = text_chunks(fragments);
                    items.push(Err(Error::streaming("connection reset", None)));
                    Ok(Box::pin(stream::iter(items)))
                }
                Reply::Reject => Err(Error::authentication("Invalid API Key")),
                Reply::Hang => Ok(Box::pin(stream::pending())),
            }
        }
    }

    fn text_chunks(fragments: &[&'static str]) -> Vec<Result<ChatCompletionChunk>> {
        fragments
            .iter()
            .map(|f| Ok(ChatCompletionChunk::text(*f)))
            .collect()
    }

    fn session(reply: Reply) -> (ChatSession<ScriptedBackend>, ScriptedBackend) {
        let backend = ScriptedBackend::new(reply);
        let config = SessionConfig::new().with_credential(Credential::new("k1"));
        (ChatSession::new(backend.clone(), config), backend)
    }

    #[test]
    fn new_session_empty() {
        let (session, _) = session(Reply::Text(vec![]));
        assert!(session.transcript().is_empty());
        assert!(!session.is_request_in_flight());
        assert_eq!(session.state(), CompletionState::Idle);
    }

    #[tokio::test]
    async fn success_appends_two_turns() {
        let (mut session, _) = session(Reply::Text(vec!["Hel", "lo, ", "world!"]));
        let mut recorder = Recorder::default();
        session.append_user_turn("hi", &mut recorder).await.unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], Turn::user("hi"));
        assert_eq!(transcript[1], Turn::assistant("Hello, world!"));
        assert_eq!(recorder.previews.len(), 3);
        assert_eq!(recorder.completed, vec!["Hello, world!"]);
        assert_eq!(session.state(), CompletionState::Idle);
        assert!(!session.is_request_in_flight());
    }

    #[tokio::test]
    async fn transcript_is_sent_in_order() {
        let (mut session, backend) = session(Reply::Text(vec!["ok"]));
        let mut recorder = Recorder::default();
        session.append_user_turn("one", &mut recorder).await.unwrap();
        session.append_user_turn("two", &mut recorder).await.unwrap();

        let sent = backend.sent();
        assert_eq!(sent.len(), 2);
        let roles: Vec<Role> = sent[1].1.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(sent[1].1.messages[2].content, "two");
        assert_eq!(session.transcript().len(), 4);
    }

    #[tokio::test]
    async fn failure_keeps_only_the_user_turn() {
        let (mut session, _) = session(Reply::FailAfter(vec!["partial"]));
        let mut recorder = Recorder::default();
        let err = session
            .append_user_turn("hi", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_remote());
        assert_eq!(session.transcript(), &[Turn::user("hi")]);
        assert_eq!(recorder.errors, 1);
        assert!(recorder.completed.is_empty());
        assert_eq!(session.state(), CompletionState::Idle);
    }

    #[tokio::test]
    async fn rejected_request_keeps_only_the_user_turn() {
        let (mut session, _) = session(Reply::Reject);
        let mut recorder = Recorder::default();
        let err = session
            .append_user_turn("hi", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(session.transcript().len(), 1);
        let stats = session.stats();
        assert_eq!((stats.requests, stats.completed, stats.failed), (1, 0, 1));
    }

    #[tokio::test]
    async fn missing_credential_sends_nothing() {
        let backend = ScriptedBackend::new(Reply::Text(vec!["never"]));
        let mut session = ChatSession::new(backend.clone(), SessionConfig::new());
        let mut recorder = Recorder::default();
        let err = session
            .append_user_turn("hi", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_missing_credential());
        assert!(session.transcript().is_empty());
        assert!(backend.sent().is_empty());
        assert!(recorder.previews.is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (mut session, backend) = session(Reply::Text(vec!["never"]));
        let mut recorder = Recorder::default();
        let err = session
            .append_user_turn("   ", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(session.transcript().is_empty());
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn submission_while_in_flight_is_rejected() {
        let (mut session, backend) = session(Reply::Text(vec!["never"]));
        session.request_in_flight = true;
        let mut recorder = Recorder::default();
        let err = session
            .append_user_turn("hi", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_request_in_flight());
        assert!(session.transcript().is_empty());
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn interrupted_reply_is_not_committed() {
        let (mut session, _) = session(Reply::Text(vec!["one", "two", "three"]));
        let mut recorder = Recorder {
            interrupt_after: Some(1),
            ..Recorder::default()
        };
        let err = session
            .append_user_turn("hi", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert!(recorder.interrupted);
        assert!(recorder.completed.is_empty());
        assert_eq!(session.transcript(), &[Turn::user("hi")]);
        assert!(!session.is_request_in_flight());
        assert_eq!(session.state(), CompletionState::Idle);
        let stats = session.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn abandoned_submission_releases_the_guard() {
        let (mut session, _) = session(Reply::Hang);
        let mut recorder = Recorder::default();
        let pending = session
            .append_user_turn("hi", &mut recorder)
            .now_or_never();
        assert!(pending.is_none());
        assert!(!session.is_request_in_flight());
        assert_eq!(session.state(), CompletionState::Idle);
        assert_eq!(session.transcript(), &[Turn::user("hi")]);
    }

    #[tokio::test]
    async fn empty_reply_is_not_committed() {
        let (mut session, _) = session(Reply::Text(vec![]));
        let mut recorder = Recorder::default();
        session.append_user_turn("hi", &mut recorder).await.unwrap();
        assert_eq!(session.transcript(), &[Turn::user("hi")]);
    }

    #[test]
    fn commit_refuses_error_text() {
        let (mut session, _) = session(Reply::Text(vec![]));
        assert!(!session.commit_assistant_turn(""));
        assert!(!session.commit_assistant_turn("Error: upstream down"));
        assert!(session.commit_assistant_turn("An Error: is fine mid-text"));
        assert_eq!(session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn clear_keeps_configuration() {
        let (mut session, _) = session(Reply::Text(vec!["ok"]));
        let mut recorder = Recorder::default();
        session.append_user_turn("hi", &mut recorder).await.unwrap();
        let before = session.configuration().clone();
        session.clear();
        assert!(session.transcript().is_empty());
        assert_eq!(session.configuration(), &before);
        session.clear();
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn build_request_passes_configuration_through() {
        let backend = ScriptedBackend::new(Reply::Text(vec![]));
        let config = SessionConfig::new()
            .with_credential(Credential::new("k"))
            .with_model(Model::from("m1"))
            .with_temperature(0.5)
            .with_max_tokens(500);
        let mut session = ChatSession::new(backend, config);
        session.transcript.push(Turn::user("hi"));

        let request = session.build_request();
        assert_eq!(request.model, Model::from("m1"));
        assert_eq!(request.temperature, 0.5);
        assert_eq!(request.max_tokens, 500);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.messages[0].content, "hi");
    }

    #[tokio::test]
    async fn configuration_is_read_at_request_time() {
        let (mut session, backend) = session(Reply::Text(vec!["ok"]));
        let mut recorder = Recorder::default();
        session.update_configuration(ConfigUpdate {
            credential: Some(Credential::new("k2")),
            model: Some(Model::from("m2")),
            ..ConfigUpdate::default()
        });
        session.append_user_turn("hi", &mut recorder).await.unwrap();

        let sent = backend.sent();
        assert_eq!(sent[0].0, "k2");
        assert_eq!(sent[0].1.model, Model::from("m2"));
    }

    #[tokio::test]
    async fn stats_track_requests() {
        let (mut session, _) = session(Reply::Text(vec!["ok"]));
        let mut recorder = Recorder::default();
        session.append_user_turn("hi", &mut recorder).await.unwrap();
        let stats = session.stats();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert!(stats.has_credential);
        assert_eq!(stats.model, Model::default());
    }

    #[test]
    fn guard_clears_flag_on_drop() {
        let mut flag = false;
        {
            let guard = InFlightGuard::new(&mut flag);
            assert!(*guard.0);
        }
        assert!(!flag);
    }
}
