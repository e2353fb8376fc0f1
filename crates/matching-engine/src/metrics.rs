//! Metrics for the Matching Engine
//!
//! Each instrument keeps a local atomic value (for [`MetricsSnapshot`]) and
//! forwards to the `metrics` facade, which is exported to Prometheus when
//! the binary installs a recorder.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Atomic counter mirrored to the metrics facade
pub struct Counter {
    value: AtomicU64,
    exported: ::metrics::Counter,
}

impl Counter {
    fn new(exported: ::metrics::Counter) -> Self {
        Self {
            value: AtomicU64::new(0),
            exported,
        }
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
        self.exported.increment(n);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for current values
pub struct Gauge {
    value: AtomicU64,
    exported: ::metrics::Gauge,
}

impl Gauge {
    fn new(exported: ::metrics::Gauge) -> Self {
        Self {
            value: AtomicU64::new(0),
            exported,
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
        self.exported.set(value as f64);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Latency histogram (count/sum/min/max locally, full distribution exported)
pub struct Histogram {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    exported: ::metrics::Histogram,
}

impl Histogram {
    fn new(exported: ::metrics::Histogram) -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            exported,
        }
    }

    pub fn record(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(us, Ordering::Relaxed);
        self.min.fetch_min(us, Ordering::Relaxed);
        self.max.fetch_max(us, Ordering::Relaxed);
        self.exported.record(duration.as_secs_f64());
    }

    pub fn get_stats(&self) -> HistogramStats {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum.load(Ordering::Relaxed);

        HistogramStats {
            count,
            sum_us: sum,
            avg_us: if count > 0 { sum / count } else { 0 },
            min_us: if count > 0 { self.min.load(Ordering::Relaxed) } else { 0 },
            max_us: self.max.load(Ordering::Relaxed),
        }
    }
}

// Facade handles carry no useful state to print
impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Gauge").field(&self.get()).finish()
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Histogram").field(&self.get_stats()).finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramStats {
    pub count: u64,
    pub sum_us: u64,
    pub avg_us: u64,
    pub min_us: u64,
    pub max_us: u64,
}

/// Metrics for one engine instance
#[derive(Debug)]
pub struct EngineMetrics {
    pub orders_received: Counter,
    pub orders_matched: Counter,
    pub orders_rested: Counter,
    pub orders_rejected: Counter,
    pub queue_full: Counter,
    pub trades_executed: Counter,
    pub orders_cancelled: Counter,
    pub sink_failures: Counter,
    pub order_processing_latency: Histogram,
    pub resting_orders: Gauge,
    pub price_levels: Gauge,
}

impl EngineMetrics {
    pub fn new(symbol: &str) -> Self {
        let symbol = symbol.to_string();
        Self {
            orders_received: Counter::new(::metrics::counter!("matching_orders_received_total", "symbol" => symbol.clone())),
            orders_matched: Counter::new(::metrics::counter!("matching_orders_matched_total", "symbol" => symbol.clone())),
            orders_rested: Counter::new(::metrics::counter!("matching_orders_rested_total", "symbol" => symbol.clone())),
            orders_rejected: Counter::new(::metrics::counter!("matching_orders_rejected_total", "symbol" => symbol.clone())),
            queue_full: Counter::new(::metrics::counter!("matching_queue_full_total", "symbol" => symbol.clone())),
            trades_executed: Counter::new(::metrics::counter!("matching_trades_total", "symbol" => symbol.clone())),
            orders_cancelled: Counter::new(::metrics::counter!("matching_orders_cancelled_total", "symbol" => symbol.clone())),
            sink_failures: Counter::new(::metrics::counter!("matching_sink_failures_total", "symbol" => symbol.clone())),
            order_processing_latency: Histogram::new(::metrics::histogram!("matching_order_latency_seconds", "symbol" => symbol.clone())),
            resting_orders: Gauge::new(::metrics::gauge!("matching_resting_orders", "symbol" => symbol.clone())),
            price_levels: Gauge::new(::metrics::gauge!("matching_price_levels", "symbol" => symbol)),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.order_processing_latency.get_stats();

        MetricsSnapshot {
            orders_received: self.orders_received.get(),
            orders_matched: self.orders_matched.get(),
            orders_rested: self.orders_rested.get(),
            orders_rejected: self.orders_rejected.get(),
            queue_full: self.queue_full.get(),
            trades_executed: self.trades_executed.get(),
            orders_cancelled: self.orders_cancelled.get(),
            sink_failures: self.sink_failures.get(),
            order_processing_latency_avg_us: latency.avg_us,
            order_processing_latency_min_us: latency.min_us,
            order_processing_latency_max_us: latency.max_us,
            resting_orders: self.resting_orders.get(),
            price_levels: self.price_levels.get(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub orders_received: u64,
    pub orders_matched: u64,
    pub orders_rested: u64,
    pub orders_rejected: u64,
    pub queue_full: u64,
    pub trades_executed: u64,
    pub orders_cancelled: u64,
    pub sink_failures: u64,
    pub order_processing_latency_avg_us: u64,
    pub order_processing_latency_min_us: u64,
    pub order_processing_latency_max_us: u64,
    pub resting_orders: u64,
    pub price_levels: u64,
}
