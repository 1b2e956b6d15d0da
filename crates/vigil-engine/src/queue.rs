//! Bounded hand-off buffer between evaluation workers and the delivery
//! consumer.

use tokio::sync::mpsc;

use vigil_common::types::AlertEvent;

/// Producer half. Cheap to clone; one clone lives in every worker. The push
/// never blocks a judging pass: a full queue reports failure and the caller
/// drops the event.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<AlertEvent>,
}

/// Consumer half, held by the single external delivery task.
pub struct EventReceiver {
    rx: mpsc::Receiver<AlertEvent>,
}

/// Build a queue with a fixed capacity; the bound caps memory use instead of
/// stalling producers.
pub fn bounded(capacity: usize) -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventQueue { tx }, EventReceiver { rx })
}

impl EventQueue {
    /// Non-blocking push; `false` when the queue is full (or the consumer is
    /// gone).
    pub fn push(&self, event: AlertEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

impl EventReceiver {
    /// Await the next event; `None` once every producer has been dropped.
    pub async fn recv(&mut self) -> Option<AlertEvent> {
        self.rx.recv().await
    }

    /// Non-blocking pop, for drain-style consumers and tests.
    pub fn try_recv(&mut self) -> Option<AlertEvent> {
        self.rx.try_recv().ok()
    }
}
