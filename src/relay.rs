//! Wire-level frame relay for streamed answers.
//!
//! Converts a backend delta stream into [`StreamFrame`]s with one hard
//! invariant: **every stream ends with exactly one terminal frame**
//! (`Done` after a clean finish, `Error` after a fault), no matter how many
//! deltas came first, including none. A raw backend fault must never abort
//! the transport without that explicit terminal frame.
//!
//! Frames travel over a bounded flume channel; a forwarding task pumps the
//! upstream into it. When the consumer walks away (drops the stream), the
//! next send fails and the task stops; per-request resources are released
//! without touching the shared index or completion backend.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::completion::CompletionStream;

/// One unit of an incremental answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamFrame {
    /// A fragment of generated text, in emission order.
    Delta(String),
    /// Clean end of stream. Terminal.
    Done,
    /// The stream failed; the message says why. Terminal.
    Error(String),
}

impl StreamFrame {
    /// `true` for `Done` and `Error`; nothing follows these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Done | StreamFrame::Error(_))
    }
}

/// Frame stream handed to streaming callers.
pub type FrameStream = flume::r#async::RecvStream<'static, StreamFrame>;

/// Frames buffered between the forwarding task and a slow consumer.
const FRAME_BUFFER: usize = 32;

/// Relay a completion delta stream as frames.
pub fn frame_stream(upstream: CompletionStream) -> FrameStream {
    let (tx, rx) = flume::bounded(FRAME_BUFFER);
    tokio::spawn(forward(upstream, tx));
    rx.into_stream()
}

/// A stream that failed before any delta: one `Error` frame, nothing else.
pub fn failed(message: impl Into<String>) -> FrameStream {
    let (tx, rx) = flume::bounded(1);
    let _ = tx.send(StreamFrame::Error(message.into()));
    rx.into_stream()
}

async fn forward(mut upstream: CompletionStream, tx: flume::Sender<StreamFrame>) {
    while let Some(item) = upstream.next().await {
        match item {
            Ok(delta) => {
                if tx.send_async(StreamFrame::Delta(delta)).await.is_err() {
                    tracing::debug!("frame consumer dropped; stopping relay");
                    return;
                }
            }
            Err(err) => {
                let _ = tx.send_async(StreamFrame::Error(err.to_string())).await;
                return;
            }
        }
    }
    let _ = tx.send_async(StreamFrame::Done).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use futures_util::stream;

    fn upstream(
        items: Vec<Result<String, CompletionError>>,
    ) -> CompletionStream {
        Box::pin(stream::iter(items))
    }

    async fn collect(frames: FrameStream) -> Vec<StreamFrame> {
        frames.collect().await
    }

    #[tokio::test]
    async fn clean_stream_ends_with_single_done() {
        let frames = collect(frame_stream(upstream(vec![
            Ok("Hel".into()),
            Ok("lo".into()),
        ])))
        .await;
        assert_eq!(
            frames,
            vec![
                StreamFrame::Delta("Hel".into()),
                StreamFrame::Delta("lo".into()),
                StreamFrame::Done,
            ]
        );
    }

    #[tokio::test]
    async fn empty_answer_still_terminates() {
        let frames = collect(frame_stream(upstream(vec![]))).await;
        assert_eq!(frames, vec![StreamFrame::Done]);
    }

    #[tokio::test]
    async fn midstream_fault_becomes_single_error_frame() {
        let frames = collect(frame_stream(upstream(vec![
            Ok("partial".into()),
            Err(CompletionError::Interrupted("backend died".into())),
            Ok("never delivered".into()),
        ])))
        .await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], StreamFrame::Delta("partial".into()));
        assert!(matches!(&frames[1], StreamFrame::Error(msg) if msg.contains("backend died")));
    }

    #[tokio::test]
    async fn exactly_one_terminal_frame_always() {
        for items in [
            vec![],
            vec![Ok("a".into())],
            vec![Err(CompletionError::Transport("x".into()))],
            vec![Ok("a".into()), Err(CompletionError::Transport("x".into()))],
        ] {
            let frames = collect(frame_stream(upstream(items))).await;
            let terminals = frames.iter().filter(|f| f.is_terminal()).count();
            assert_eq!(terminals, 1, "frames: {frames:?}");
            assert!(frames.last().unwrap().is_terminal());
        }
    }

    #[tokio::test]
    async fn failed_yields_only_an_error_frame() {
        let frames = collect(failed("no index")).await;
        assert_eq!(frames, vec![StreamFrame::Error("no index".into())]);
    }

    #[tokio::test]
    async fn dropped_consumer_stops_forwarding() {
        // An endless upstream: the relay must stop once the consumer is gone.
        let endless = Box::pin(stream::repeat_with(|| Ok("tick".to_string())));
        let frames = frame_stream(endless);
        drop(frames);
        // Give the forwarding task a moment to observe the disconnect.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // Nothing to assert directly: the test passes by not hanging and is
        // kept as a regression guard for the disconnect path.
    }

    #[test]
    fn frames_serialize_tagged() {
        let json = serde_json::to_string(&StreamFrame::Delta("hi".into())).unwrap();
        assert_eq!(json, r#"{"type":"delta","data":"hi"}"#);
        let json = serde_json::to_string(&StreamFrame::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }
}
