//! Event stream: the observer notifications as an async `Stream`.
//!
//! Useful when the consumer is itself async (a WebSocket handler, an SSE
//! endpoint) and would otherwise have to bridge the callback trait onto a
//! channel. Each call to [`crate::DocumentIntake::events`] creates an
//! independent subscription that sees events from that point on.
//!
//! Subscribers that fall more than `event_capacity` events behind skip the
//! oldest ones. Every `SelectionChanged` carries the whole selection, so a
//! skipped one is superseded by the next.

use crate::error::{UploadError, ValidationError};
use crate::output::SelectionSnapshot;
use crate::tracker::FileId;
use futures::StreamExt;
use serde::Serialize;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::warn;

/// One notification from the intake.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum IntakeEvent {
    /// The selection settled into a new state.
    SelectionChanged(SelectionSnapshot),
    /// One file's upload failed.
    UploadFailed { id: FileId, error: UploadError },
    /// A selected batch was rejected; nothing was added.
    BatchRejected(ValidationError),
}

/// A boxed stream of intake events.
pub type EventStream = Pin<Box<dyn Stream<Item = IntakeEvent> + Send>>;

pub(crate) fn event_stream(rx: broadcast::Receiver<IntakeEvent>) -> EventStream {
    let stream = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Event subscriber lagging: {}", e);
                None
            }
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lagged_events_are_skipped() {
        let (tx, rx) = broadcast::channel(1);
        let events = event_stream(rx);
        tx.send(IntakeEvent::BatchRejected(ValidationError::Empty { name: "1".into() }))
            .unwrap();
        tx.send(IntakeEvent::BatchRejected(ValidationError::Empty { name: "2".into() }))
            .unwrap();
        drop(tx);

        let got: Vec<IntakeEvent> = events.collect().await;
        assert_eq!(got.len(), 1);
        assert!(matches!(
            &got[0],
            IntakeEvent::BatchRejected(ValidationError::Empty { name }) if name == "2"
        ));
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let e = IntakeEvent::BatchRejected(ValidationError::Empty { name: "x".into() });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event"], "batch_rejected");
    }
}
