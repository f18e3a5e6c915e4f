//! Accumulates streamed fragments into a complete message while passing them through.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::{ChatCompletionChunk, Error};

/// A stream wrapper that folds chunk fragments into one `String`.
///
/// Each chunk that carries text is yielded as a fragment and appended to the
/// accumulator; chunks without text are swallowed. When the inner stream is
/// fully drained, the accumulated text is sent via the oneshot channel
/// returned by `new()`. If the inner stream fails, the error is yielded and
/// also sent through the channel, and the stream ends.
///
/// ```
/// # tokio_test::block_on(async {
/// use futures::{StreamExt, stream};
/// use groqchat::{AccumulatingStream, ChatCompletionChunk};
///
/// let chunks = stream::iter(vec![
///     Ok(ChatCompletionChunk::text("Hel")),
///     Ok(ChatCompletionChunk::text("lo")),
/// ]);
/// let (mut fragments, text) = AccumulatingStream::new(chunks);
/// while let Some(fragment) = fragments.next().await {
///     fragment.unwrap();
/// }
/// assert_eq!(text.await.unwrap().unwrap(), "Hello");
/// # });
/// ```
pub struct AccumulatingStream {
    inner: Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, Error>> + Send>>,
    text_tx: Option<tokio::sync::oneshot::Sender<Result<String, Error>>>,
    text: String,
    fragments: usize,
    done: bool,
}

impl AccumulatingStream {
    /// Wraps a chunk stream to accumulate its fragments.
    ///
    /// Returns the fragment stream and a receiver that will contain the
    /// accumulated text once the stream is fully drained.
    pub fn new<S>(stream: S) -> (Self, tokio::sync::oneshot::Receiver<Result<String, Error>>)
    where
        S: Stream<Item = Result<ChatCompletionChunk, Error>> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            text_tx: Some(tx),
            text: String::new(),
            fragments: 0,
            done: false,
        };
        (this, rx)
    }

    /// The text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of fragments folded so far.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Takes the currently accumulated text without draining the stream.
    ///
    /// The completion channel is dropped, so its receiver sees a closed
    /// channel instead of a result.
    pub fn finalize_partial(&mut self) -> String {
        self.text_tx.take();
        self.done = true;
        std::mem::take(&mut self.text)
    }

    fn finish(&mut self, result: Result<String, Error>) {
        self.done = true;
        if let Some(tx) = self.text_tx.take() {
            let _ = tx.send(result);
        }
    }
}

impl Stream for AccumulatingStream {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let Some(fragment) = chunk.fragment() else {
                        continue;
                    };
                    let fragment = fragment.to_string();
                    self.text.push_str(&fragment);
                    self.fragments += 1;
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finish(Err(e.clone()));
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    let text = self.text.clone();
                    self.finish(Ok(text));
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    fn scripted(items: Vec<Result<ChatCompletionChunk, Error>>) -> AccumulatingStreamParts {
        AccumulatingStream::new(stream::iter(items))
    }

    type AccumulatingStreamParts = (
        AccumulatingStream,
        tokio::sync::oneshot::Receiver<Result<String, Error>>,
    );

    #[tokio::test]
    async fn folds_fragments_in_order() {
        let (mut stream, rx) = scripted(vec![
            Ok(ChatCompletionChunk::text("Hel")),
            Ok(ChatCompletionChunk::text("lo, ")),
            Ok(ChatCompletionChunk::text("world!")),
        ]);
        let mut seen = Vec::new();
        while let Some(fragment) = stream.next().await {
            seen.push(fragment.unwrap());
        }
        assert_eq!(seen, vec!["Hel", "lo, ", "world!"]);
        assert_eq!(stream.fragment_count(), 3);
        assert_eq!(rx.await.unwrap().unwrap(), "Hello, world!");
    }

    #[tokio::test]
    async fn skips_chunks_without_text() {
        let (mut stream, rx) = scripted(vec![
            Ok(ChatCompletionChunk::default()),
            Ok(ChatCompletionChunk::text("a")),
            Ok(ChatCompletionChunk::text("")),
            Ok(ChatCompletionChunk::text("b")),
        ]);
        let fragments: Vec<_> = (&mut stream).collect().await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(rx.await.unwrap().unwrap(), "ab");
    }

    #[tokio::test]
    async fn error_is_forwarded_and_ends_the_stream() {
        let (mut stream, rx) = scripted(vec![
            Ok(ChatCompletionChunk::text("partial")),
            Err(Error::streaming("connection reset", None)),
            Ok(ChatCompletionChunk::text("never")),
        ]);
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn finalize_partial_closes_the_channel() {
        let (mut stream, rx) = scripted(vec![
            Ok(ChatCompletionChunk::text("half")),
            Ok(ChatCompletionChunk::text(" more")),
        ]);
        assert_eq!(stream.next().await.unwrap().unwrap(), "half");
        assert_eq!(stream.finalize_partial(), "half");
        assert!(stream.next().await.is_none());
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_text() {
        let (mut stream, rx) = scripted(Vec::new());
        assert!(stream.next().await.is_none());
        assert_eq!(rx.await.unwrap().unwrap(), "");
    }
}
