//! Accumulates streamed reply fragments into a complete reply while passing them through.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::backend::{Reply, ReplyChunk};
use crate::{Error, UsageMetadata};

/// A stream wrapper that accumulates `ReplyChunk`s into a complete `Reply`.
///
/// This allows revealing fragments to the user while simultaneously building
/// the final reply.  When the stream is fully drained, the accumulated reply
/// is sent via the oneshot channel returned by `new()`; if any item was an
/// error, the first error is sent instead.  Dropping the stream early drops
/// the sender, so an abandoned stream never yields a reply.
pub struct AccumulatingStream {
    inner: Pin<Box<dyn Stream<Item = Result<ReplyChunk, Error>> + Send>>,
    reply_tx: Option<tokio::sync::oneshot::Sender<Result<Reply, Error>>>,
    text: String,
    usage: Option<UsageMetadata>,
    error: Option<Error>,
}

impl AccumulatingStream {
    /// Wraps a fragment stream to accumulate its text into a `Reply`.
    ///
    /// Returns the stream and a receiver that will contain the accumulated
    /// `Reply` once the stream is fully drained.
    pub fn new<S>(stream: S) -> (Self, tokio::sync::oneshot::Receiver<Result<Reply, Error>>)
    where
        S: Stream<Item = Result<ReplyChunk, Error>> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            reply_tx: Some(tx),
            text: String::new(),
            usage: None,
            error: None,
        };
        (this, rx)
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn accumulate(&mut self, chunk: &ReplyChunk) {
        self.text.push_str(&chunk.text);
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    fn finalize(&mut self) -> Result<Reply, Error> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        Ok(Reply {
            text: std::mem::take(&mut self.text),
            finish_reason: None,
            usage: self.usage,
        })
    }
}

impl Stream for AccumulatingStream {
    type Item = Result<ReplyChunk, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.accumulate(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if self.error.is_none() {
                    self.error = Some(e.clone());
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(tx) = self.reply_tx.take() {
                    let reply = self.finalize();
                    let _ = tx.send(reply);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    #[tokio::test]
    async fn accumulates_text_and_last_usage() {
        let chunks = vec![
            Ok(ReplyChunk::text("Hello")),
            Ok(ReplyChunk {
                text: ", world".to_string(),
                usage: Some(UsageMetadata::new(4, 2)),
            }),
        ];
        let (mut stream, rx) = AccumulatingStream::new(stream::iter(chunks));

        let mut seen = Vec::new();
        while let Some(chunk) = stream.next().await {
            seen.push(chunk.unwrap().text);
        }
        assert_eq!(seen, vec!["Hello", ", world"]);

        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply.text, "Hello, world");
        assert_eq!(reply.usage, Some(UsageMetadata::new(4, 2)));
    }

    #[tokio::test]
    async fn error_item_fails_the_reply() {
        let chunks = vec![
            Ok(ReplyChunk::text("part")),
            Err(Error::streaming("reset", None)),
        ];
        let (mut stream, rx) = AccumulatingStream::new(stream::iter(chunks));
        while stream.next().await.is_some() {}

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Streaming { .. }));
    }

    #[tokio::test]
    async fn dropped_stream_sends_nothing() {
        let chunks = vec![Ok(ReplyChunk::text("a")), Ok(ReplyChunk::text("b"))];
        let (mut stream, rx) = AccumulatingStream::new(stream::iter(chunks));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text, "a");
        assert_eq!(stream.text(), "a");
        drop(stream);

        assert!(rx.await.is_err());
    }
}
