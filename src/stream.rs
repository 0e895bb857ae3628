//! Outbound text stream for one request
//!
//! ```text
//! StepEngine ──send_text──► StreamSink ──mpsc──► ChatStream ──► HTTP body
//!                                                    │
//!                                        dropped ────┴──► CancellationToken::cancel
//! ```
//!
//! The producer side is consumed by [`StreamSink::close`], so the stream is
//! closed exactly once. Dropping the consumer side (client went away) fires
//! the request's cancellation token.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Buffered chunks between producer and consumer
const CHANNEL_CAPACITY: usize = 64;

/// Create a connected sink/stream pair for one request
pub fn channel(cancel: CancellationToken) -> (StreamSink, ChatStream) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let sink = StreamSink { tx };
    let stream = ChatStream {
        inner: ReceiverStream::new(rx),
        _cancel_on_drop: cancel.drop_guard(),
    };
    (sink, stream)
}

/// Producer half: forwards prose to the caller
pub struct StreamSink {
    tx: mpsc::Sender<Bytes>,
}

impl StreamSink {
    /// Forward a model text delta. Returns false once the caller is gone.
    pub async fn send_text(&self, text: &str) -> bool {
        if text.is_empty() {
            return !self.tx.is_closed();
        }
        self.send(Bytes::copy_from_slice(text.as_bytes())).await
    }

    /// Append a service notice (not model output) on its own paragraph
    pub async fn send_notice(&self, notice: &str) -> bool {
        self.send(Bytes::from(format!("\n\n{}", notice))).await
    }

    /// Whether the caller has dropped the stream
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// End the stream
    pub fn close(self) {
        debug!("Closing response stream");
    }

    async fn send(&self, chunk: Bytes) -> bool {
        self.tx.send(chunk).await.is_ok()
    }
}

/// Consumer half: a text-only byte stream
pub struct ChatStream {
    inner: ReceiverStream<Bytes>,
    _cancel_on_drop: DropGuard,
}

impl Stream for ChatStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_next(cx)
            .map(|chunk| chunk.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_text_arrives_in_order_and_stream_ends_on_close() {
        let (sink, stream) = channel(CancellationToken::new());
        tokio::spawn(async move {
            sink.send_text("Sprint 3 ").await;
            sink.send_text("looks on track.").await;
            sink.close();
        });
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        let text: Vec<u8> = chunks.concat();
        assert_eq!(text, b"Sprint 3 looks on track.");
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_request() {
        let cancel = CancellationToken::new();
        let (sink, stream) = channel(cancel.clone());
        drop(stream);
        assert!(cancel.is_cancelled());
        assert!(sink.is_closed());
        assert!(!sink.send_text("late").await);
    }

    #[tokio::test]
    async fn test_notice_is_separated() {
        let (sink, mut stream) = channel(CancellationToken::new());
        sink.send_text("Answer.").await;
        sink.send_notice("(not saved)").await;
        sink.close();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Answer.\n\n(not saved)");
    }
}
