use crate::*;
use regex::Regex;
use thiserror::Error;

/// Upper bound on a sensible submission queue
const MAX_QUEUE_CAPACITY: usize = 1 << 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Engine symbol is required")]
    MissingSymbol,

    #[error("Invalid symbol '{0}'. Must be 2-20 uppercase letters or digits (e.g., BTCUSDT)")]
    InvalidSymbol(String),

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("queue_capacity {0} exceeds the maximum of {max}", max = MAX_QUEUE_CAPACITY)]
    QueueTooLarge(usize),

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Metrics port must be non-zero when metrics are enabled")]
    InvalidMetricsPort,

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MatchingConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_engine(&config.engine, &mut report);
    validate_logging(&config.logging, &mut report);
    validate_metrics(&config.metrics, &mut report);

    report
}

fn validate_engine(engine: &EngineSection, report: &mut ValidationReport) {
    validate_symbol(&engine.symbol, report);

    match engine.queue_capacity {
        None => report.add_default("engine.queue_capacity", &default_queue_capacity().to_string()),
        Some(0) => report.add_error(ValidationError::InvalidPositiveInteger {
            field: "engine.queue_capacity".to_string(),
        }),
        Some(n) if n > MAX_QUEUE_CAPACITY => report.add_error(ValidationError::QueueTooLarge(n)),
        Some(n) if n < 16 => report.add_warning(
            "engine.queue_capacity",
            "Very small queue; producers will see QueueFull on short bursts",
        ),
        Some(_) => {}
    }

    match engine.halt_backoff_ms {
        None => report.add_default("engine.halt_backoff_ms", &default_halt_backoff_ms().to_string()),
        Some(0) => report.add_error(ValidationError::InvalidPositiveInteger {
            field: "engine.halt_backoff_ms".to_string(),
        }),
        Some(ms) if ms > 10_000 => report.add_warning(
            "engine.halt_backoff_ms",
            "Queued tasks wait up to this long for a Halted reply after a halt",
        ),
        Some(_) => {}
    }

    if engine.idle_spins.is_none() {
        report.add_default("engine.idle_spins", &default_idle_spins().to_string());
    }

    match engine.idle_sleep_us {
        None => report.add_default("engine.idle_sleep_us", &default_idle_sleep_us().to_string()),
        Some(0) => report.add_warning(
            "engine.idle_sleep_us",
            "Zero idle sleep keeps the matching worker spinning on an idle core",
        ),
        Some(us) if us > 10_000 => report.add_warning(
            "engine.idle_sleep_us",
            "Long idle sleep adds latency to the first order after a quiet period",
        ),
        Some(_) => {}
    }

    match engine.snapshot_depth {
        None => report.add_default("engine.snapshot_depth", &default_snapshot_depth().to_string()),
        Some(0) => report.add_error(ValidationError::InvalidPositiveInteger {
            field: "engine.snapshot_depth".to_string(),
        }),
        Some(_) => {}
    }

    match engine.worker_thread_name.as_deref() {
        None => report.add_default("engine.worker_thread_name", &default_worker_thread_name()),
        Some(name) if name.trim().is_empty() => {
            report.add_warning("engine.worker_thread_name", "Empty thread name makes the worker hard to find in profilers")
        }
        Some(_) => {}
    }
}

fn validate_symbol(symbol: &str, report: &mut ValidationReport) {
    if symbol.is_empty() {
        report.add_error(ValidationError::MissingSymbol);
        return;
    }

    if has_unresolved_env_vars(symbol) {
        report.add_error(ValidationError::InvalidEnvVar {
            var: symbol.to_string(),
            message: "placeholder was not substituted".to_string(),
        });
        return;
    }

    match Regex::new(r"^[A-Z0-9]{2,20}$") {
        Ok(re) if re.is_match(symbol) => {}
        Ok(_) => report.add_error(ValidationError::InvalidSymbol(symbol.to_string())),
        Err(e) => report.add_warning("engine.symbol", &format!("Symbol check skipped: {e}")),
    }
}

fn validate_logging(logging: &LoggingSection, report: &mut ValidationReport) {
    let valid_formats = ["pretty", "json", "compact"];
    if !valid_formats.contains(&logging.format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(logging.format.clone()));
    }
}

fn validate_metrics(metrics: &MetricsSection, report: &mut ValidationReport) {
    if !metrics.enabled {
        return;
    }
    if metrics.port == 0 {
        report.add_error(ValidationError::InvalidMetricsPort);
    } else if metrics.port < 1024 {
        report.add_warning("metrics.port", "Privileged port; the exporter may fail to bind");
    }
}
