//! Ordered, replay-free delivery of pipeline events.
//!
//! The executor writes through an [`EventSink`]; the caller reads the matching [`EventStream`]
//! either incrementally or by draining it to the terminal event.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;

use super::domain::{AssessmentResult, RunId};
use super::pipeline::{PipelineError, PipelineEvent};

/// Wire line written after the terminal event.
pub const END_OF_STREAM: &str = "{\"type\":\"end_of_stream\"}";

/// Single-writer side of a run's event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: mpsc::Sender<PipelineEvent>,
    terminated: Arc<AtomicBool>,
}

impl EventSink {
    /// Non-terminal events are dropped once a terminal event was sent.
    pub(crate) async fn emit(&self, event: PipelineEvent) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        let _ = self.sender.send(event).await;
    }

    /// Sends the terminal event. Returns false if one was already sent.
    pub(crate) async fn finish(&self, event: PipelineEvent) -> bool {
        debug_assert!(event.is_terminal());
        if self.terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.sender.send(event).await;
        true
    }

    /// Resolves when the consumer dropped its stream.
    pub(crate) async fn detached(&self) {
        self.sender.closed().await;
    }
}

/// Consumer side of one run's events.
#[derive(Debug)]
pub struct EventStream {
    run_id: RunId,
    receiver: mpsc::Receiver<PipelineEvent>,
}

pub(crate) fn channel(run_id: RunId, capacity: usize) -> (EventSink, EventStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        EventSink {
            sender,
            terminated: Arc::new(AtomicBool::new(false)),
        },
        EventStream { run_id, receiver },
    )
}

impl EventStream {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.receiver.recv().await
    }

    /// Drains every event and surfaces only the terminal outcome.
    pub async fn into_result(mut self) -> Result<AssessmentResult, PipelineError> {
        while let Some(event) = self.next_event().await {
            match event {
                PipelineEvent::PipelineCompleted { result } => return Ok(*result),
                PipelineEvent::PipelineFailed { error } => return Err(error),
                _ => {}
            }
        }
        Err(PipelineError::Internal {
            reason: "event stream closed without a terminal event".to_string(),
        })
    }
}

impl Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// One newline-terminated JSON line per event.
pub fn encode_line(event: &PipelineEvent) -> String {
    match serde_json::to_string(event) {
        Ok(mut line) => {
            line.push('\n');
            line
        }
        Err(err) => {
            let fallback = PipelineEvent::PipelineFailed {
                error: PipelineError::Internal {
                    reason: format!("event could not be encoded: {err}"),
                },
            };
            let mut line = serde_json::to_string(&fallback)
                .unwrap_or_else(|_| "{\"type\":\"pipeline_failed\"}".to_string());
            line.push('\n');
            line
        }
    }
}

/// NDJSON rendering of a run, ending with [`END_OF_STREAM`].
pub fn ndjson_lines(events: EventStream) -> impl Stream<Item = String> + Send + 'static {
    events
        .map(|event| encode_line(&event))
        .chain(stream::once(async { format!("{END_OF_STREAM}\n") }))
}
