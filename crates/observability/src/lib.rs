//! Observability infrastructure for the OpenExchange matching engine
//!
//! This crate provides:
//! - Structured logging via tracing
//! - The Prometheus exporter for the engine's `metrics` series
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! // Initialize logging
//! init_logging("matchd", LogFormat::Pretty)?;
//!
//! // Initialize metrics (optional)
//! observability::init_metrics(9100)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_default, LogFormat};
pub use metrics::{describe_engine_metrics, init_metrics};
