//! The completion reducer.
//!
//! A [`CompletionReducer`] turns one [`ChatCompletionRequest`] into one
//! assistant message. It opens a stream on a [`CompletionBackend`], folds the
//! fragments with an [`AccumulatingStream`], and reports progress to a
//! [`Renderer`]. It never touches the transcript; committing the result is
//! the session's job.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::accumulating_stream::AccumulatingStream;
use crate::client::CompletionBackend;
use crate::observability::{
    REDUCER_COMPLETED, REDUCER_FAILED, REDUCER_FRAGMENTS, REDUCER_INTERRUPTED, STREAM_DURATION,
    STREAM_TTFF,
};
use crate::render::{CURSOR_MARKER, Renderer};
use crate::{ChatCompletionRequest, Credential, Error};

/// How often a stalled request re-checks the observer's interrupt flag.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where a completion is in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompletionState {
    /// No request outstanding.
    Idle,
    /// Request sent, no fragment received yet.
    Requesting,
    /// At least one fragment received.
    Streaming,
    /// The stream was exhausted.
    Completed,
    /// The request or stream failed, or was interrupted.
    Failed,
}

impl CompletionState {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompletionState::Completed | CompletionState::Failed)
    }
}

/// The result of one completion.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The full assistant text, folded from every fragment.
    Completed(String),
    /// Why the completion did not finish. Partial text is dropped.
    Failed(Error),
}

/// Per-session completion state machine.
#[derive(Debug)]
pub struct CompletionReducer {
    state: CompletionState,
}

impl CompletionReducer {
    /// Creates an idle reducer.
    pub fn new() -> Self {
        Self {
            state: CompletionState::Idle,
        }
    }

    /// The current state.
    pub fn state(&self) -> CompletionState {
        self.state
    }

    /// Returns a terminal reducer to `Idle` once the session has reacted.
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            self.state = CompletionState::Idle;
        }
    }

    /// Runs one completion to a terminal state.
    ///
    /// Every fragment produces one `on_fragment` call with the live preview.
    /// Exactly one of `on_complete`, `on_error` or `on_interrupted` follows.
    /// There is no retry.
    pub async fn reduce<B>(
        &mut self,
        backend: &B,
        credential: &Credential,
        request: ChatCompletionRequest,
        observer: &mut dyn Renderer,
    ) -> CompletionOutcome
    where
        B: CompletionBackend + ?Sized,
    {
        let mut run = RunGuard::new(&mut self.state);
        *run.state = CompletionState::Requesting;
        let started = Instant::now();

        let opened = match interruptible(backend.stream(credential, request), &*observer).await {
            Some(Ok(stream)) => stream,
            Some(Err(err)) => return fail(run.state, err, observer),
            None => return interrupt(run.state, observer),
        };

        let (mut fragments, text_rx) = AccumulatingStream::new(opened);
        loop {
            match interruptible(fragments.next(), &*observer).await {
                Some(Some(Ok(_))) => {
                    if *run.state == CompletionState::Requesting {
                        STREAM_TTFF.add(started.elapsed().as_secs_f64());
                        *run.state = CompletionState::Streaming;
                    }
                    REDUCER_FRAGMENTS.click();
                    let preview = format!("{}{CURSOR_MARKER}", fragments.text());
                    observer.on_fragment(&preview);
                }
                Some(Some(Err(err))) => return fail(run.state, err, observer),
                Some(None) => break,
                None => {
                    fragments.finalize_partial();
                    return interrupt(run.state, observer);
                }
            }
        }

        let text = match text_rx.await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return fail(run.state, err, observer),
            Err(_) => {
                return fail(
                    run.state,
                    Error::streaming("stream ended without producing a result", None),
                    observer,
                );
            }
        };
        STREAM_DURATION.add(started.elapsed().as_secs_f64());
        REDUCER_COMPLETED.click();
        *run.state = CompletionState::Completed;
        observer.on_complete(&text);
        CompletionOutcome::Completed(text)
    }
}

/// Puts the state back to `Idle` if a run is dropped before it ends.
struct RunGuard<'a> {
    state: &'a mut CompletionState,
}

impl<'a> RunGuard<'a> {
    fn new(state: &'a mut CompletionState) -> Self {
        Self { state }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            *self.state = CompletionState::Idle;
        }
    }
}

fn fail(
    state: &mut CompletionState,
    err: Error,
    observer: &mut dyn Renderer,
) -> CompletionOutcome {
    REDUCER_FAILED.click();
    *state = CompletionState::Failed;
    observer.on_error(&err);
    CompletionOutcome::Failed(err)
}

fn interrupt(state: &mut CompletionState, observer: &mut dyn Renderer) -> CompletionOutcome {
    REDUCER_INTERRUPTED.click();
    *state = CompletionState::Failed;
    observer.on_interrupted();
    CompletionOutcome::Failed(Error::abort("interrupted by user"))
}

impl Default for CompletionReducer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives `future` to completion unless the observer asks to stop first.
///
/// Returns `None` when interrupted; the future is dropped, which abandons any
/// in-flight connection.
async fn interruptible<F>(future: F, observer: &dyn Renderer) -> Option<F::Output>
where
    F: Future,
{
    tokio::pin!(future);
    loop {
        if observer.should_interrupt() {
            return None;
        }
        if let Ok(output) = tokio::time::timeout(INTERRUPT_POLL_INTERVAL, &mut future).await {
            return Some(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChunkStream;
    use crate::{ChatCompletionChunk, Model, Result, Turn};
    use futures::FutureExt;
    use futures::stream;

    #[derive(Default)]
    struct Recorder {
        previews: Vec<String>,
        completed: Option<String>,
        errors: Vec<String>,
        interrupted: bool,
        interrupt_after: Option<usize>,
    }

    impl Renderer for Recorder {
        fn on_fragment(&mut self, preview: &str) {
            self.previews.push(preview.to_string());
        }

        fn on_complete(&mut self, text: &str) {
            self.completed = Some(text.to_string());
        }

        fn on_error(&mut self, error: &Error) {
            self.errors.push(error.to_string());
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

    enum Script {
        Chunks(Vec<Result<ChatCompletionChunk>>),
        Reject(Error),
        Hang,
    }

    struct ScriptedBackend(Script);

    #[async_trait::async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn stream(
            &self,
            _credential: &Credential,
            _request: ChatCompletionRequest,
        ) -> Result<ChunkStream> {
            match &self.0 {
                Script::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.clone()))),
                Script::Reject(err) => Err(err.clone()),
                Script::Hang => Ok(Box::pin(stream::pending())),
            }
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new(Model::from("m1"), &[Turn::user("hi")], 0.5, 500)
    }

    fn text_chunks(fragments: &[&str]) -> Script {
        Script::Chunks(
            fragments
                .iter()
                .map(|f| Ok(ChatCompletionChunk::text(*f)))
                .collect(),
        )
    }

    async fn run(script: Script, recorder: &mut Recorder) -> (CompletionOutcome, CompletionState) {
        let backend = ScriptedBackend(script);
        let mut reducer = CompletionReducer::new();
        let outcome = reducer
            .reduce(&backend, &Credential::new("k"), request(), recorder)
            .await;
        (outcome, reducer.state())
    }

    #[tokio::test]
    async fn fragments_fold_into_one_message() {
        let mut recorder = Recorder::default();
        let (outcome, state) = run(text_chunks(&["Hel", "lo, ", "world!"]), &mut recorder).await;
        assert!(matches!(outcome, CompletionOutcome::Completed(ref t) if t == "Hello, world!"));
        assert_eq!(state, CompletionState::Completed);
        assert_eq!(
            recorder.previews,
            vec!["Hel▌", "Hello, ▌", "Hello, world!▌"]
        );
        assert_eq!(recorder.completed.as_deref(), Some("Hello, world!"));
        assert!(recorder.errors.is_empty());
    }

    #[tokio::test]
    async fn immediate_exhaustion_completes_empty() {
        let mut recorder = Recorder::default();
        let (outcome, state) = run(Script::Chunks(Vec::new()), &mut recorder).await;
        assert!(matches!(outcome, CompletionOutcome::Completed(ref t) if t.is_empty()));
        assert_eq!(state, CompletionState::Completed);
        assert!(recorder.previews.is_empty());
    }

    #[tokio::test]
    async fn rejected_request_fails() {
        let mut recorder = Recorder::default();
        let (outcome, state) = run(
            Script::Reject(Error::authentication("Invalid API Key")),
            &mut recorder,
        )
        .await;
        assert!(matches!(outcome, CompletionOutcome::Failed(ref e) if e.is_authentication()));
        assert_eq!(state, CompletionState::Failed);
        assert_eq!(recorder.errors, vec!["Authentication error: Invalid API Key"]);
        assert!(recorder.completed.is_none());
    }

    #[tokio::test]
    async fn mid_stream_error_drops_partial_text() {
        let mut recorder = Recorder::default();
        let script = Script::Chunks(vec![
            Ok(ChatCompletionChunk::text("partial")),
            Err(Error::streaming("connection reset", None)),
        ]);
        let (outcome, state) = run(script, &mut recorder).await;
        assert!(matches!(outcome, CompletionOutcome::Failed(Error::Streaming { .. })));
        assert_eq!(state, CompletionState::Failed);
        assert_eq!(recorder.previews, vec!["partial▌"]);
        assert!(recorder.completed.is_none());
    }

    #[tokio::test]
    async fn interrupt_stops_streaming() {
        let mut recorder = Recorder {
            interrupt_after: Some(1),
            ..Recorder::default()
        };
        let (outcome, _) = run(text_chunks(&["one", "two", "three"]), &mut recorder).await;
        assert!(matches!(outcome, CompletionOutcome::Failed(ref e) if e.is_abort()));
        assert!(recorder.interrupted);
        assert_eq!(recorder.previews.len(), 1);
        assert!(recorder.completed.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_reaches_a_stalled_stream() {
        let mut recorder = Recorder {
            interrupt_after: Some(0),
            ..Recorder::default()
        };
        let (outcome, state) = run(Script::Hang, &mut recorder).await;
        assert!(matches!(outcome, CompletionOutcome::Failed(ref e) if e.is_abort()));
        assert_eq!(state, CompletionState::Failed);
    }

    #[tokio::test]
    async fn dropped_run_returns_to_idle() {
        let backend = ScriptedBackend(Script::Hang);
        let mut reducer = CompletionReducer::new();
        let mut recorder = Recorder::default();
        let credential = Credential::new("k");
        let run = reducer.reduce(&backend, &credential, request(), &mut recorder);
        assert!(run.now_or_never().is_none());
        assert_eq!(reducer.state(), CompletionState::Idle);
        assert!(recorder.errors.is_empty());
        assert!(!recorder.interrupted);
    }

    #[test]
    fn reset_only_leaves_terminal_states() {
        let mut reducer = CompletionReducer::new();
        reducer.state = CompletionState::Streaming;
        reducer.reset();
        assert_eq!(reducer.state(), CompletionState::Streaming);
        reducer.state = CompletionState::Failed;
        reducer.reset();
        assert_eq!(reducer.state(), CompletionState::Idle);
    }
}
