//! Prometheus metrics infrastructure
//!
//! The matching engine records through the `metrics` facade; this module
//! installs the Prometheus exporter that serves those series and registers
//! their help text.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize the Prometheus metrics exporter
///
/// Starts an HTTP listener on `port` exposing `/metrics`, then describes
/// the engine series.
///
/// # Example
///
/// ```ignore
/// observability::init_metrics(9100)?;
/// // Metrics available at http://localhost:9100/metrics
/// ```
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_engine_metrics();
    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Register help text for every series the matching engine emits
///
/// Each series carries a `symbol` label.
pub fn describe_engine_metrics() {
    describe_counter!("matching_orders_received_total", "Orders accepted into the submission queue");
    describe_counter!("matching_orders_matched_total", "Orders that traded at least once");
    describe_counter!("matching_orders_rested_total", "Orders that left a remainder on the book");
    describe_counter!("matching_orders_rejected_total", "Orders rejected by validation, the matcher or a halt");
    describe_counter!("matching_queue_full_total", "Submissions refused because the queue was full");
    describe_counter!("matching_trades_total", "Trades executed");
    describe_counter!("matching_orders_cancelled_total", "Resting orders cancelled");
    describe_counter!("matching_sink_failures_total", "Event sink writes that failed after a book mutation");
    describe_counter!("matching_engine_halts_total", "Circuit breaker transitions to HALTED");
    describe_histogram!(
        "matching_order_latency_seconds",
        Unit::Seconds,
        "Time spent matching one order on the worker"
    );
    describe_gauge!("matching_resting_orders", "Orders currently resting on the book");
    describe_gauge!("matching_price_levels", "Price levels currently on the book");
}
