//! Ordered event stream from a run to its observer.

use tokio::sync::mpsc;
use tracing::debug;

use agora_types::{ProgressStep, RunEvent};

/// Buffer size of the channel created by [`EventSink::channel`].
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Producer half of a run's event stream.
///
/// The sink is owned by the run. Dropping it closes the stream, so the
/// observer sees end-of-stream exactly once however the run exits. An
/// observer that goes away does not stop the run; later events are discarded.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<RunEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }

    /// A sink and the receiver observing it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Deliver one record, waiting for buffer space.
    pub async fn emit(&self, event: RunEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Event observer disconnected, dropping event");
        }
    }

    pub async fn progress(&self, step: ProgressStep, message: impl Into<String>) {
        self.emit(RunEvent::progress(step, message)).await;
    }

    /// Deliver the terminal record and close the stream.
    pub async fn finish(self, event: RunEvent) {
        debug_assert!(event.is_terminal());
        self.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::BatchSummary;

    #[tokio::test]
    async fn test_events_arrive_in_order_then_close() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.progress(ProgressStep::Generating, "one").await;
        sink.progress(ProgressStep::Ready, "two").await;
        sink.finish(RunEvent::Done(BatchSummary::default())).await;

        assert!(rx.recv().await.unwrap().is_step(ProgressStep::Generating));
        assert!(rx.recv().await.unwrap().is_step(ProgressStep::Ready));
        assert!(rx.recv().await.unwrap().is_terminal());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_closes_stream() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.progress(ProgressStep::Generating, "one").await;
        drop(sink);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_observer_is_ignored() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.progress(ProgressStep::Generating, "nobody listening").await;
        sink.finish(RunEvent::error("still fine")).await;
    }
}
