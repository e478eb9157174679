//! The two carriers. Both are thin adapters over `RpcDispatcher::handle_frame`.

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use super::codec;
use super::dispatch::RpcDispatcher;
use crate::job::Job;

/// First frame sent on every duplex connection.
pub const GREETING: &str = r#"{"status":"connected"}"#;

/// Serve calls from `incoming` until either side closes. Responses are
/// written in call order; job status events from `events` are pushed
/// between calls. Returns the number of calls answered.
pub async fn serve_duplex<I, O>(
    rpc: &RpcDispatcher,
    mut incoming: I,
    mut outgoing: O,
    events: Option<broadcast::Receiver<Job>>,
) -> usize
where
    I: Stream<Item = String> + Unpin,
    O: Sink<String> + Unpin,
{
    let mut events = events;
    let mut answered = 0;
    if outgoing.send(GREETING.to_string()).await.is_err() {
        return answered;
    }
    loop {
        tokio::select! {
            biased;
            frame = incoming.next() => {
                let Some(frame) = frame else { break };
                let response = rpc.handle_frame(&frame).await;
                if outgoing.send(response).await.is_err() {
                    break;
                }
                answered += 1;
            }
            event = next_event(&mut events) => match event {
                Ok(job) => {
                    if outgoing.send(codec::encode_status_event(&job)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "status events dropped for slow connection");
                }
                Err(RecvError::Closed) => events = None,
            },
        }
    }
    answered
}

async fn next_event(events: &mut Option<broadcast::Receiver<Job>>) -> Result<Job, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Answer one call carried in a request body.
pub async fn single_shot(rpc: &RpcDispatcher, body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(frame) => rpc.handle_frame(frame).await,
        Err(e) => codec::encode_response(&codec::ResponseFrame::err(
            serde_json::Value::Null,
            codec::RpcError::parse_error(e.to_string()),
        )),
    }
}
