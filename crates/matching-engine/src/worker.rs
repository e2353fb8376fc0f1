//! Matching worker
//!
//! The only execution context that ever touches the order book. It runs on
//! a dedicated OS thread for the lifetime of the engine, drains the
//! submission queue in order, and answers each task on its own completion
//! channel.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::book::OrderBook;
use crate::circuit_breaker::CircuitBreaker;
use crate::domain::Order;
use crate::error::{EngineError, MatchingError};
use crate::log::EventSink;
use crate::matcher::Matcher;
use crate::metrics::EngineMetrics;
use crate::queue::{MatchTask, Polled, QueueConsumer, Reply};
use crate::result::{MatchStatus, MatchingResult};

/// Idle and halt pacing for the worker loop
#[derive(Debug, Clone)]
pub(crate) struct WorkerPacing {
    /// Empty polls answered with `yield_now` before sleeping
    pub(crate) idle_spins: u32,
    /// Sleep once the spin budget is spent
    pub(crate) idle_sleep: Duration,
    /// Sleep between checks while halted
    pub(crate) halt_backoff: Duration,
}

pub(crate) struct MatchingWorker {
    matcher: Matcher,
    consumer: QueueConsumer,
    breaker: Arc<CircuitBreaker>,
    sink: Box<dyn EventSink>,
    metrics: Arc<EngineMetrics>,
    shutdown: Arc<AtomicBool>,
    pacing: WorkerPacing,
}

impl MatchingWorker {
    pub(crate) fn new(
        matcher: Matcher,
        consumer: QueueConsumer,
        breaker: Arc<CircuitBreaker>,
        sink: Box<dyn EventSink>,
        metrics: Arc<EngineMetrics>,
        shutdown: Arc<AtomicBool>,
        pacing: WorkerPacing,
    ) -> Self {
        Self {
            matcher,
            consumer,
            breaker,
            sink,
            metrics,
            shutdown,
            pacing,
        }
    }

    /// Start the worker on its own named thread
    ///
    /// The thread hands the book back when it exits.
    pub(crate) fn spawn(self, thread_name: &str) -> std::io::Result<JoinHandle<OrderBook>> {
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) -> OrderBook {
        info!(
            symbol = %self.matcher.book().symbol(),
            sequence = self.matcher.sequence(),
            resting_orders = self.matcher.book().order_count(),
            "Matching worker started"
        );
        self.publish_book_gauges();

        let mut idle_polls: u32 = 0;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            if self.breaker.is_halted() {
                self.reject_pending(EngineError::Halted);
                thread::sleep(self.pacing.halt_backoff);
                continue;
            }

            match self.consumer.poll() {
                Polled::Ready(task) => {
                    idle_polls = 0;
                    self.dispatch(task);
                }
                Polled::Empty => {
                    idle_polls = idle_polls.saturating_add(1);
                    if idle_polls <= self.pacing.idle_spins {
                        thread::yield_now();
                    } else {
                        thread::sleep(self.pacing.idle_sleep);
                    }
                }
                Polled::Closed => break,
            }
        }

        self.consumer.close();
        self.reject_pending(EngineError::Disconnected);
        if let Err(e) = self.sink.flush() {
            warn!(error = %e, "Event sink flush failed during shutdown");
        }
        info!(
            symbol = %self.matcher.book().symbol(),
            sequence = self.matcher.sequence(),
            "Matching worker stopped"
        );
        self.matcher.into_book()
    }

    /// Answer every queued task with `error` without touching the book
    fn reject_pending(&mut self, error: EngineError) {
        let mut rejected = 0usize;
        while let Polled::Ready(task) = self.consumer.poll() {
            task.reject(error.clone());
            rejected += 1;
        }
        if rejected > 0 {
            self.metrics.orders_rejected.add(rejected as u64);
            warn!(rejected, %error, "Rejected queued tasks");
        }
    }

    /// Process one dequeued task unless a halt landed after the loop's check
    fn dispatch(&mut self, task: MatchTask) {
        if self.breaker.is_halted() {
            self.metrics.orders_rejected.increment();
            debug!(task = task.kind(), "Task dequeued after halt");
            task.reject(EngineError::Halted);
            return;
        }
        self.handle(task);
    }

    fn handle(&mut self, task: MatchTask) {
        match task {
            MatchTask::Submit { order, reply } => {
                let subject = Subject::Order(order.order_id);
                let response = self.submit(order);
                deliver(reply, response, subject);
            }
            MatchTask::Cancel { order_id, reply } => {
                let response = self.cancel(order_id);
                deliver(reply, response, Subject::Order(order_id));
            }
            MatchTask::Snapshot { depth, reply } => {
                let response = self.guarded(Subject::Snapshot, |m| m.snapshot(depth));
                deliver(reply, response, Subject::Snapshot);
            }
        }
    }

    /// Run a matcher operation; a panic or a fatal error halts the engine
    fn guarded<T>(
        &mut self,
        subject: Subject,
        op: impl FnOnce(&mut Matcher) -> Result<T, MatchingError>,
    ) -> Result<T, EngineError> {
        let matcher = &mut self.matcher;
        match panic::catch_unwind(AssertUnwindSafe(|| op(matcher))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.matching_failure(subject, e)),
            Err(payload) => Err(self.fatal(subject, panic_message(payload))),
        }
    }

    fn submit(&mut self, order: Order) -> Result<MatchingResult, EngineError> {
        let started = Instant::now();
        let order_id = order.order_id;

        let result = self.guarded(Subject::Order(order_id), |m| m.apply_order(order))?;

        self.journal();

        self.metrics.order_processing_latency.record(started.elapsed());
        if result.has_trades() {
            self.metrics.trades_executed.add(result.trades.len() as u64);
        }
        match result.status {
            MatchStatus::Matched => self.metrics.orders_matched.increment(),
            MatchStatus::PartiallyMatched => {
                self.metrics.orders_matched.increment();
                self.metrics.orders_rested.increment();
            }
            MatchStatus::Pending => self.metrics.orders_rested.increment(),
        }
        self.publish_book_gauges();

        debug!(
            order_id = %order_id,
            status = ?result.status,
            trades = result.trades.len(),
            remaining = %result.remaining_quantity,
            "Order processed"
        );
        Ok(result)
    }

    fn cancel(&mut self, order_id: Uuid) -> Result<Order, EngineError> {
        let cancelled = self
            .guarded(Subject::Order(order_id), |m| m.cancel(order_id))?
            .ok_or(EngineError::OrderNotFound(order_id))?;

        self.journal();
        self.metrics.orders_cancelled.increment();
        self.publish_book_gauges();
        info!(order_id = %order_id, remaining = %cancelled.quantity, "Order cancelled");
        Ok(cancelled)
    }

    /// Hand this task's events to the sink; a failure halts the engine
    ///
    /// The book is already mutated at this point and has no undo log, so the
    /// producer still receives its result.
    fn journal(&mut self) {
        let events = self.matcher.take_events();
        let written = events
            .iter()
            .try_for_each(|event| self.sink.append(event))
            .and_then(|_| self.sink.flush());

        if let Err(e) = written {
            self.metrics.sink_failures.increment();
            error!(
                error = %e,
                events = events.len(),
                last_sequence = events.last().map(|e| e.sequence()),
                "Event sink write failed after book mutation"
            );
            self.breaker.halt(format!("event sink write failed: {e}"));
        }
    }

    fn matching_failure(&mut self, subject: Subject, error: MatchingError) -> EngineError {
        if error.is_fatal() {
            return self.fatal(subject, error.to_string());
        }
        self.matcher.take_events();
        self.metrics.orders_rejected.increment();
        warn!(%subject, %error, "Order rejected by matcher");
        EngineError::InvalidOrder(error.to_string())
    }

    fn fatal(&mut self, subject: Subject, message: String) -> EngineError {
        // Partial mutations are left in place; only a restart with replay recovers
        self.matcher.take_events();
        error!(%subject, %message, "Fatal failure inside matching loop");
        self.breaker.halt(format!("matching failure on {subject}: {message}"));
        EngineError::Internal(message)
    }

    fn publish_book_gauges(&self) {
        let book = self.matcher.book();
        self.metrics.resting_orders.set(book.order_count() as u64);
        self.metrics.price_levels.set(book.level_count() as u64);
    }
}

/// What a task was working on, for logs and halt reasons
#[derive(Debug, Clone, Copy)]
enum Subject {
    Order(Uuid),
    Snapshot,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Order(id) => write!(f, "order {id}"),
            Subject::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Answer a task; the producer may have stopped waiting (timeout)
fn deliver<T>(reply: Reply<T>, response: Result<T, EngineError>, subject: Subject) {
    if let Err(undelivered) = reply.send(response) {
        debug!(
            %subject,
            ok = undelivered.is_ok(),
            "Producer stopped waiting; result dropped"
        );
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in matching loop".to_string()
    }
}
