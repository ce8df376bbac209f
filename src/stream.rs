//! Response Streamer.
//!
//! Wraps a gateway fragment channel as a `Stream` of fragments that always
//! ends with exactly one terminal item: `Done` on a clean end of stream, or
//! `Error` on an upstream failure. Fragments are forwarded one by one in
//! arrival order and are never merged. Cancelling (or dropping) the stream
//! closes the channel, which stops the producer at its next send.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum StreamFragment {
    Chunk(String),
    Done,
    Error(String),
}

impl StreamFragment {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFragment::Chunk(_))
    }
}

pub struct ResponseStream {
    rx: Option<mpsc::Receiver<Result<String, ApiError>>>,
}

impl ResponseStream {
    pub fn new(rx: mpsc::Receiver<Result<String, ApiError>>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Stops consuming. The producer observes a closed channel and ends;
    /// no terminal fragment follows a cancellation.
    pub fn cancel(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
    }
}

impl Stream for ResponseStream {
    type Item = StreamFragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => Poll::Ready(Some(StreamFragment::Chunk(fragment))),
            Poll::Ready(Some(Err(err))) => {
                tracing::warn!(error = %err, "Upstream failed mid-stream");
                self.cancel();
                Poll::Ready(Some(StreamFragment::Error(err.to_string())))
            }
            Poll::Ready(None) => {
                self.rx = None;
                Poll::Ready(Some(StreamFragment::Done))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn fragments(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("part{i} ")).collect()
    }

    #[tokio::test]
    async fn delivers_all_fragments_in_order_then_done() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for part in fragments(5) {
                tx.send(Ok(part)).await.unwrap();
            }
        });

        let received: Vec<StreamFragment> = ResponseStream::new(rx).collect().await;
        let mut expected: Vec<StreamFragment> =
            fragments(5).into_iter().map(StreamFragment::Chunk).collect();
        expected.push(StreamFragment::Done);
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn upstream_error_ends_stream_with_error_fragment() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok("one".to_string())).await.unwrap();
        tx.send(Err(ApiError::upstream("connection reset"))).await.unwrap();
        tx.send(Ok("never".to_string())).await.unwrap();
        drop(tx);

        let received: Vec<StreamFragment> = ResponseStream::new(rx).collect().await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], StreamFragment::Chunk("one".into()));
        assert!(matches!(&received[1], StreamFragment::Error(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn cancellation_stops_the_producer() {
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(async move {
            let mut sent = 0;
            for part in fragments(5) {
                if tx.send(Ok(part)).await.is_err() {
                    break;
                }
                sent += 1;
            }
            sent
        });

        let mut stream = ResponseStream::new(rx);
        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        stream.cancel();

        assert_eq!(first, StreamFragment::Chunk("part0 ".into()));
        assert_eq!(second, StreamFragment::Chunk("part1 ".into()));
        assert!(stream.next().await.is_none());

        let sent = producer.await.unwrap();
        assert!(sent < 5, "producer kept sending after cancel ({sent})");
    }

    #[test]
    fn fragments_serialize_as_tagged_frames() {
        let json = serde_json::to_value(StreamFragment::Chunk("hi".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "chunk", "content": "hi"}));
        assert!(StreamFragment::Done.is_terminal());
    }
}
