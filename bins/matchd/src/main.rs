//! OpenExchange Matching Engine Binary
//!
//! Loads the engine configuration, replays resting orders, starts the
//! matching worker and feeds it an order file from several concurrent
//! producers. Results and the final book are printed as JSON lines.

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use config::{
    generate_default_config, load_config, save_config, validate_config, MatchingConfig,
    ValidationReport,
};
use matching_engine::{
    EngineConfig, EngineError, JsonLinesJournal, MatchingEngine, MatchingResult, Order,
};
use observability::{init_logging, init_metrics, LogFormat};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retries for a submission refused with `QueueFull`
const MAX_SUBMIT_RETRIES: u32 = 8;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run {
            config,
            history,
            orders,
            journal,
            depth,
            producers,
            log_format,
        } => {
            let loaded = load_config(&config)?;
            let format = log_format
                .map(|f| f.as_str().to_string())
                .unwrap_or_else(|| loaded.logging.format.clone());
            init_logging("matchd", LogFormat::parse(&format).unwrap_or_default())?;
            info!("Executing 'run' command");

            let args = RunArgs {
                history,
                orders,
                journal,
                depth,
                producers,
            };
            run_command(loaded, args).await
        }
        Commands::Validate { config } => {
            init_logging("matchd", LogFormat::Pretty)?;
            info!("Executing 'validate' command");
            validate_command(config)
        }
        Commands::Init { output, symbol } => {
            init_logging("matchd", LogFormat::Pretty)?;
            info!("Executing 'init' command");
            init_command(output, symbol)
        }
    }
}

// ============================================================================
// run
// ============================================================================

struct RunArgs {
    history: Option<PathBuf>,
    orders: Option<PathBuf>,
    journal: Option<PathBuf>,
    depth: Option<usize>,
    producers: usize,
}

/// One line of output per processed order
#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum OrderOutcome {
    Matched { result: MatchingResult },
    Rejected { order_id: uuid::Uuid, error: String },
}

async fn run_command(config: MatchingConfig, args: RunArgs) -> Result<()> {
    let report = validate_config(&config);
    log_report(&report);
    if !report.is_valid() {
        anyhow::bail!("Cannot start matching engine due to configuration errors");
    }

    if config.metrics.enabled {
        init_metrics(config.metrics.port)?;
    }

    let engine_config = EngineConfig::from(&config.engine);
    let depth = args.depth.unwrap_or(engine_config.snapshot_depth);
    let mut builder = MatchingEngine::builder(engine_config);

    if let Some(path) = &args.journal {
        let journal = JsonLinesJournal::open(path)
            .with_context(|| format!("Failed to open journal: {:?}", path))?;
        builder = builder.with_event_sink(journal);
    }

    if let Some(path) = &args.history {
        let history = read_orders(path)?;
        let replayed = builder.replay_history(history)?;
        info!(replayed, path = ?path, "History replayed");
    }

    let engine = Arc::new(builder.start()?);

    if let Some(path) = &args.orders {
        let orders = read_orders(path)?;
        submit_concurrently(&engine, orders, args.producers).await?;
    }

    if engine.is_halted() {
        let status = engine.status();
        error!(reason = ?status.reason, "Engine halted during run");
        println!("{}", serde_json::to_string(&status)?);
    } else {
        let snapshot = engine.snapshot(depth).await?;
        println!("{}", serde_json::to_string(&snapshot)?);
    }
    println!("{}", serde_json::to_string(&engine.metrics())?);

    let halted = engine.is_halted();
    if let Some(book) = engine.shutdown() {
        info!(resting_orders = book.order_count(), "Final book");
    }

    if halted {
        anyhow::bail!("Matching engine halted; restart with history replay after investigation");
    }
    Ok(())
}

/// Split the orders round-robin across producers; each submits its share in order
async fn submit_concurrently(
    engine: &Arc<MatchingEngine>,
    orders: Vec<Order>,
    producers: usize,
) -> Result<()> {
    let producers = producers.max(1);
    let mut shares: Vec<Vec<Order>> = (0..producers).map(|_| Vec::new()).collect();
    for (i, order) in orders.into_iter().enumerate() {
        shares[i % producers].push(order);
    }

    let tasks = shares.into_iter().map(|share| {
        let engine = Arc::clone(engine);
        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(share.len());
            for order in share {
                outcomes.push(submit_with_retry(&engine, order).await);
            }
            outcomes
        })
    });

    for joined in futures::future::join_all(tasks).await {
        for outcome in joined.context("Producer task failed")? {
            println!("{}", serde_json::to_string(&outcome)?);
        }
    }
    Ok(())
}

/// Retry `QueueFull` with exponential backoff; every other error is final
async fn submit_with_retry(engine: &MatchingEngine, order: Order) -> OrderOutcome {
    let order_id = order.order_id;
    let mut backoff = Duration::from_millis(1);

    for attempt in 0..=MAX_SUBMIT_RETRIES {
        match engine.submit(order.clone()).await {
            Ok(result) => return OrderOutcome::Matched { result },
            Err(e) if e.is_retryable() && attempt < MAX_SUBMIT_RETRIES => {
                debug!(order_id = %order_id, attempt, error = %e, "Retrying submission");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => {
                if e == EngineError::Halted {
                    error!(order_id = %order_id, "Order refused: engine halted");
                } else {
                    warn!(order_id = %order_id, error = %e, "Order rejected");
                }
                return OrderOutcome::Rejected {
                    order_id,
                    error: e.to_string(),
                };
            }
        }
    }

    OrderOutcome::Rejected {
        order_id,
        error: EngineError::QueueFull.to_string(),
    }
}

/// Read one JSON order per line, skipping blank lines and `#` comments
fn read_orders(path: &Path) -> Result<Vec<Order>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read order file: {:?}", path))?;
    parse_orders(&content).with_context(|| format!("Invalid order file: {:?}", path))
}

fn parse_orders(content: &str) -> Result<Vec<Order>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: malformed order", n + 1))
        })
        .collect()
}

// ============================================================================
// validate / init
// ============================================================================

fn log_report(report: &ValidationReport) {
    for default in &report.defaults_applied {
        debug!(field = %default.field, value = %default.value, "Default applied");
    }
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    for err in &report.errors {
        error!("{}", err);
    }
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Symbol: {}", config.engine.symbol);
    println!("Queue capacity: {}", config.engine.queue_capacity());
    println!("Halt backoff: {} ms", config.engine.halt_backoff_ms());
    println!("Log format: {}", config.logging.format);
    if config.metrics.enabled {
        println!("Metrics: enabled on port {}", config.metrics.port);
    } else {
        println!("Metrics: disabled");
    }

    Ok(())
}

fn init_command<P: AsRef<Path>>(output_path: P, symbol: Option<String>) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let mut config = generate_default_config();
    if let Some(symbol) = symbol {
        config.engine.symbol = symbol;
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!("Symbol: {}", config.engine.symbol);
    println!();
    println!("Next steps:");
    println!(
        "  1. Run 'matchd validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  2. Run 'matchd run --config {:?} --orders orders.jsonl' to match an order file",
        output_path
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_orders_skips_blank_and_comment_lines() {
        let content = r#"
# resting liquidity
{"symbol":"BTCUSDT","side":"SELL","price":"100","quantity":"1.0"}

{"symbol":"BTCUSDT","side":"buy","price":101,"quantity":0.5}
"#;
        let orders = parse_orders(content).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].price, dec!(100));
        assert_eq!(orders[1].quantity, dec!(0.5));
    }

    #[test]
    fn test_parse_orders_reports_line_number() {
        let content = "{\"symbol\":\"BTCUSDT\",\"side\":\"BUY\",\"price\":1,\"quantity\":1}\nnot json\n";
        let err = parse_orders(content).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[tokio::test]
    async fn test_submit_concurrently_matches_every_order() {
        let engine = Arc::new(
            MatchingEngine::builder(EngineConfig::new("BTCUSDT"))
                .start()
                .unwrap(),
        );
        let orders: Vec<_> = (0..20)
            .map(|i| Order::buy("BTCUSDT", dec!(90) + rust_decimal::Decimal::from(i), dec!(1)))
            .collect();

        submit_concurrently(&engine, orders, 3).await.unwrap();

        let snapshot = engine.snapshot(50).await.unwrap();
        assert_eq!(snapshot.bids.len(), 20);
        assert_eq!(engine.metrics().orders_received, 20);
    }

    #[tokio::test]
    async fn test_submit_with_retry_reports_validation_error() {
        let engine = MatchingEngine::builder(EngineConfig::new("BTCUSDT"))
            .start()
            .unwrap();
        let outcome = submit_with_retry(&engine, Order::buy("ETHUSDT", dec!(1), dec!(1))).await;
        assert!(matches!(outcome, OrderOutcome::Rejected { .. }));
    }
}
