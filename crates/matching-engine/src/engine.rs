//! Matching Engine handle
//!
//! [`EngineBuilder`] owns the order book during bootstrap, when persisted
//! resting orders are replayed straight into the book. [`EngineBuilder::start`]
//! moves the book onto the matching worker thread and returns the
//! [`MatchingEngine`] handle that producers share.
//!
//! CRITICAL PROPERTIES:
//! 1. Single writer (only the worker thread ever touches the book)
//! 2. Processing order equals successful enqueue order
//! 3. A full queue rejects immediately and never mutates the book
//! 4. A halt is final for the lifetime of the engine

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::book::OrderBook;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus, EngineState};
use crate::domain::{Order, OrderBookSnapshot};
use crate::error::{EngineError, MatchingError};
use crate::log::{EventSink, NullSink};
use crate::matcher::Matcher;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::queue::{self, MatchTask, OfferRejected, QueueProducer, Reply};
use crate::result::MatchingResult;
use crate::worker::{MatchingWorker, WorkerPacing};

// ============================================================================
// Configuration
// ============================================================================

/// Runtime configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Symbol this engine matches
    pub symbol: String,
    /// Submission queue capacity
    pub queue_capacity: usize,
    /// Sleep between checks while halted
    pub halt_backoff: Duration,
    /// Empty polls answered with a yield before the worker sleeps
    pub idle_spins: u32,
    /// Worker sleep once the spin budget is spent
    pub idle_sleep: Duration,
    /// Default number of levels per side in a snapshot
    pub snapshot_depth: usize,
    /// Name of the worker thread
    pub worker_thread_name: String,
}

impl EngineConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            queue_capacity: 65_536,
            halt_backoff: Duration::from_millis(100),
            idle_spins: 64,
            idle_sleep: Duration::from_micros(50),
            snapshot_depth: 20,
            worker_thread_name: "matching-worker".to_string(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_halt_backoff(mut self, backoff: Duration) -> Self {
        self.halt_backoff = backoff;
        self
    }

    fn pacing(&self) -> WorkerPacing {
        WorkerPacing {
            idle_spins: self.idle_spins,
            idle_sleep: self.idle_sleep,
            halt_backoff: self.halt_backoff,
        }
    }
}

impl From<&config::EngineSection> for EngineConfig {
    fn from(section: &config::EngineSection) -> Self {
        Self {
            symbol: section.symbol.clone(),
            queue_capacity: section.queue_capacity(),
            halt_backoff: Duration::from_millis(section.halt_backoff_ms()),
            idle_spins: section.idle_spins(),
            idle_sleep: Duration::from_micros(section.idle_sleep_us()),
            snapshot_depth: section.snapshot_depth(),
            worker_thread_name: section.worker_thread_name(),
        }
    }
}

/// Largest quantity a single order may carry (whole units)
///
/// Keeps the aggregated quantity of a price level far inside `Decimal` range.
pub const MAX_ORDER_QUANTITY: u64 = 1_000_000_000_000_000;

/// Checks every order must pass before it reaches the book
fn validate_order(symbol: &str, order: &Order) -> Result<(), EngineError> {
    if order.symbol != symbol {
        return Err(EngineError::invalid_order(format!(
            "symbol {} does not match engine symbol {}",
            order.symbol, symbol
        )));
    }
    if order.quantity <= Decimal::ZERO {
        return Err(EngineError::invalid_order(format!(
            "quantity must be positive, got {}",
            order.quantity
        )));
    }
    if order.quantity > Decimal::from(MAX_ORDER_QUANTITY) {
        return Err(EngineError::invalid_order(format!(
            "quantity {} exceeds the maximum of {}",
            order.quantity, MAX_ORDER_QUANTITY
        )));
    }
    if order.price <= Decimal::ZERO {
        return Err(EngineError::invalid_order(format!(
            "price must be positive, got {}",
            order.price
        )));
    }
    Ok(())
}

// ============================================================================
// Builder (bootstrap and replay)
// ============================================================================

/// Engine under construction
///
/// Owns the book exclusively until [`EngineBuilder::start`], so replay can
/// never race the worker.
pub struct EngineBuilder {
    config: EngineConfig,
    book: OrderBook,
    sequence: u64,
    sink: Box<dyn EventSink>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        let book = OrderBook::new(config.symbol.clone());
        Self {
            config,
            book,
            sequence: 0,
            sink: Box::new(NullSink),
        }
    }

    /// Route matching events to `sink` instead of discarding them
    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Put a previously resting order back into the book
    ///
    /// Bypasses the queue and the matching algorithm: replayed orders were
    /// already matched against each other when they were first accepted.
    /// Orders must be replayed in their original acceptance order. An order
    /// without a sequence is stamped with the next one.
    pub fn replay_order(&mut self, mut order: Order) -> Result<(), EngineError> {
        validate_order(&self.config.symbol, &order)?;
        if order.sequence == u64::MAX {
            return Err(EngineError::invalid_order(format!(
                "order {} replayed with sequence {}; no room left for live orders",
                order.order_id,
                u64::MAX
            )));
        }

        if order.sequence == 0 {
            order.sequence = self.sequence + 1;
        }
        let sequence = order.sequence;
        let order_id = order.order_id;

        self.book.add(order).map_err(|e| match e {
            MatchingError::DuplicateOrder(id) => {
                EngineError::invalid_order(format!("order {id} replayed twice"))
            }
            other => EngineError::Internal(other.to_string()),
        })?;
        self.sequence = self.sequence.max(sequence);

        debug!(order_id = %order_id, sequence, "Replayed resting order");
        Ok(())
    }

    /// Replay a whole history in order, returning how many orders were added
    pub fn replay_history<I>(&mut self, orders: I) -> Result<usize, EngineError>
    where
        I: IntoIterator<Item = Order>,
    {
        let mut replayed = 0;
        for order in orders {
            self.replay_order(order)?;
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Book as reconstructed so far
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Hand the book to a new worker thread and return the engine handle
    pub fn start(self) -> Result<MatchingEngine, EngineError> {
        let EngineBuilder {
            config,
            book,
            sequence,
            sink,
        } = self;

        if book.is_crossed() {
            warn!(
                symbol = %config.symbol,
                best_bid = ?book.best_bid(),
                best_ask = ?book.best_ask(),
                "Replayed book is crossed; resting orders are kept as they are"
            );
        }

        let resting_orders = book.order_count();
        let (producer, consumer) = queue::bounded(config.queue_capacity);
        let breaker = Arc::new(CircuitBreaker::new(config.symbol.clone()));
        let metrics = Arc::new(EngineMetrics::new(&config.symbol));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = MatchingWorker::new(
            Matcher::new(book, sequence),
            consumer,
            Arc::clone(&breaker),
            sink,
            Arc::clone(&metrics),
            Arc::clone(&shutdown),
            config.pacing(),
        )
        .spawn(&config.worker_thread_name)
        .map_err(|e| EngineError::Internal(format!("failed to spawn matching worker: {e}")))?;

        info!(
            symbol = %config.symbol,
            queue_capacity = producer.capacity(),
            resting_orders,
            sequence,
            "Matching engine started"
        );

        Ok(MatchingEngine {
            config,
            producer,
            breaker,
            metrics,
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("resting_orders", &self.book.order_count())
            .field("sequence", &self.sequence)
            .finish()
    }
}

// ============================================================================
// Engine handle
// ============================================================================

/// Handle to a running matching engine
///
/// Safe to share across threads (`Arc<MatchingEngine>`). Dropping the handle
/// stops the worker.
pub struct MatchingEngine {
    config: EngineConfig,
    producer: QueueProducer,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<EngineMetrics>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<OrderBook>>>,
}

type Pending<T> = oneshot::Receiver<Result<T, EngineError>>;

impl MatchingEngine {
    /// Start bootstrapping an engine
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Submit an order and block until the worker has matched it
    ///
    /// Must not be called from inside an async runtime; use [`Self::submit`]
    /// there instead.
    pub fn submit_order(&self, order: Order) -> Result<MatchingResult, EngineError> {
        let pending = self.enqueue_order(order)?;
        pending
            .blocking_recv()
            .unwrap_or(Err(EngineError::Disconnected))
    }

    /// Submit an order and wait for its result
    pub async fn submit(&self, order: Order) -> Result<MatchingResult, EngineError> {
        let pending = self.enqueue_order(order)?;
        pending.await.unwrap_or(Err(EngineError::Disconnected))
    }

    /// Submit with a caller-side deadline
    ///
    /// On timeout the task stays queued and is still matched; only the wait
    /// is abandoned.
    pub async fn submit_with_timeout(
        &self,
        order: Order,
        timeout: Duration,
    ) -> Result<MatchingResult, EngineError> {
        let order_id = order.order_id;
        match tokio::time::timeout(timeout, self.submit(order)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(order_id = %order_id, timeout_ms = timeout.as_millis() as u64, "Submission timed out");
                Err(EngineError::Timeout)
            }
        }
    }

    fn enqueue_order(&self, order: Order) -> Result<Pending<MatchingResult>, EngineError> {
        if let Err(e) = validate_order(&self.config.symbol, &order) {
            self.metrics.orders_rejected.increment();
            warn!(order_id = %order.order_id, error = %e, "Order rejected before enqueue");
            return Err(e);
        }
        let pending = self.enqueue(|reply| MatchTask::Submit { order, reply })?;
        self.metrics.orders_received.increment();
        Ok(pending)
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Cancel a resting order, blocking until the worker has removed it
    pub fn cancel_order(&self, order_id: Uuid) -> Result<Order, EngineError> {
        let pending = self.enqueue(|reply| MatchTask::Cancel { order_id, reply })?;
        pending
            .blocking_recv()
            .unwrap_or(Err(EngineError::Disconnected))
    }

    /// Cancel a resting order
    pub async fn cancel(&self, order_id: Uuid) -> Result<Order, EngineError> {
        let pending = self.enqueue(|reply| MatchTask::Cancel { order_id, reply })?;
        pending.await.unwrap_or(Err(EngineError::Disconnected))
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Depth view with up to `depth` levels per side, produced on the worker
    pub fn get_order_book_snapshot(&self, depth: usize) -> Result<OrderBookSnapshot, EngineError> {
        let pending = self.enqueue(|reply| MatchTask::Snapshot { depth, reply })?;
        pending
            .blocking_recv()
            .unwrap_or(Err(EngineError::Disconnected))
    }

    /// Async variant of [`Self::get_order_book_snapshot`]
    pub async fn snapshot(&self, depth: usize) -> Result<OrderBookSnapshot, EngineError> {
        let pending = self.enqueue(|reply| MatchTask::Snapshot { depth, reply })?;
        pending.await.unwrap_or(Err(EngineError::Disconnected))
    }

    /// Offer a task without blocking
    fn enqueue<T>(
        &self,
        task: impl FnOnce(Reply<T>) -> MatchTask,
    ) -> Result<Pending<T>, EngineError> {
        if self.breaker.is_halted() {
            return Err(EngineError::Halted);
        }

        let (reply, pending) = oneshot::channel();
        match self.producer.try_offer(task(reply)) {
            Ok(()) => Ok(pending),
            Err(OfferRejected::Full(task)) => {
                self.metrics.queue_full.increment();
                warn!(
                    symbol = %self.config.symbol,
                    task = task.kind(),
                    capacity = self.producer.capacity(),
                    "Submission queue full"
                );
                Err(EngineError::QueueFull)
            }
            Err(OfferRejected::Closed(_)) => Err(EngineError::Disconnected),
        }
    }

    // ------------------------------------------------------------------------
    // Circuit breaker
    // ------------------------------------------------------------------------

    /// Halt the engine (operator or persistence collaborator)
    pub fn halt(&self) -> bool {
        self.halt_with_reason("halt requested")
    }

    /// Halt with an explanation recorded in the status
    pub fn halt_with_reason(&self, reason: impl Into<String>) -> bool {
        self.breaker.halt(reason)
    }

    pub fn is_halted(&self) -> bool {
        self.breaker.is_halted()
    }

    pub fn state(&self) -> EngineState {
        self.breaker.state()
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        self.breaker.status()
    }

    // ------------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------------

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Tasks waiting in the submission queue
    pub fn queue_depth(&self) -> usize {
        self.producer.len()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Stop the worker and take back the book
    ///
    /// Tasks still queued are answered with [`EngineError::Disconnected`].
    /// Returns `None` if the engine was already shut down.
    pub fn shutdown(&self) -> Option<OrderBook> {
        self.shutdown.store(true, Ordering::Release);
        let handle = self.worker.lock().take()?;
        match handle.join() {
            Ok(book) => {
                info!(symbol = %self.config.symbol, resting_orders = book.order_count(), "Matching engine shut down");
                Some(book)
            }
            Err(_) => {
                error!(symbol = %self.config.symbol, "Matching worker panicked");
                None
            }
        }
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("symbol", &self.config.symbol)
            .field("state", &self.state())
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}
