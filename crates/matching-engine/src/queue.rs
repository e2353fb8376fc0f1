//! Submission queue
//!
//! Bounded multiple-producer / single-consumer queue between order intake
//! and the matching worker. `offer` never blocks: a full queue is the
//! engine's only backpressure signal. The order in which tasks are accepted
//! is the order in which the worker processes them.

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::{Order, OrderBookSnapshot};
use crate::error::EngineError;
use crate::result::MatchingResult;

/// Completion channel for one task
pub type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Unit of work flowing to the matching worker
#[derive(Debug)]
pub enum MatchTask {
    /// Match an incoming order
    Submit {
        order: Order,
        reply: Reply<MatchingResult>,
    },
    /// Cancel a resting order
    Cancel {
        order_id: Uuid,
        reply: Reply<Order>,
    },
    /// Produce a depth snapshot on the worker thread
    Snapshot {
        depth: usize,
        reply: Reply<OrderBookSnapshot>,
    },
}

impl MatchTask {
    /// Answer the task with an error without touching the book
    pub fn reject(self, error: EngineError) {
        // The producer may have stopped waiting (timeout); nothing to do then
        match self {
            MatchTask::Submit { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            MatchTask::Cancel { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            MatchTask::Snapshot { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            MatchTask::Submit { .. } => "submit",
            MatchTask::Cancel { .. } => "cancel",
            MatchTask::Snapshot { .. } => "snapshot",
        }
    }
}

/// Why `offer` refused a task
#[derive(Debug)]
pub enum OfferRejected {
    /// Queue at capacity
    Full(MatchTask),
    /// Consumer gone
    Closed(MatchTask),
}

/// Result of a non-blocking dequeue
#[derive(Debug)]
pub enum Polled {
    Ready(MatchTask),
    Empty,
    /// Every producer is gone and the queue is drained
    Closed,
}

/// Build a bounded queue; capacity is clamped to at least one slot
pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Producer half, cheap to clone
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<MatchTask>,
}

impl QueueProducer {
    /// Non-blocking enqueue returning the task on refusal
    pub fn try_offer(&self, task: MatchTask) -> Result<(), OfferRejected> {
        self.tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => OfferRejected::Full(task),
            TrySendError::Closed(task) => OfferRejected::Closed(task),
        })
    }

    /// Non-blocking enqueue; false means "engine busy"
    pub fn offer(&self, task: MatchTask) -> bool {
        self.try_offer(task).is_ok()
    }

    /// Number of tasks waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of waiting tasks
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half, owned by the matching worker
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<MatchTask>,
}

impl QueueConsumer {
    /// Non-blocking dequeue
    pub fn poll(&mut self) -> Polled {
        match self.rx.try_recv() {
            Ok(task) => Polled::Ready(task),
            Err(TryRecvError::Empty) => Polled::Empty,
            Err(TryRecvError::Disconnected) => Polled::Closed,
        }
    }

    /// Refuse new tasks; those already queued can still be polled
    pub fn close(&mut self) {
        self.rx.close();
    }
}
