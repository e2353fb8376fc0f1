use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "matchd")]
#[command(about = "OpenExchange matching engine - single-symbol price-time priority matcher")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay history, start the engine and match an order file
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "matchd.yaml", env = "MATCHD_CONFIG")]
        config: PathBuf,

        /// JSON-lines file of resting orders to replay before starting
        #[arg(long)]
        history: Option<PathBuf>,

        /// JSON-lines file of orders to submit once the engine is running
        #[arg(long)]
        orders: Option<PathBuf>,

        /// JSON-lines file the matching events are journaled to
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Levels per side in the final snapshot (defaults to engine.snapshot_depth)
        #[arg(long)]
        depth: Option<usize>,

        /// Number of concurrent producers submitting the order file
        #[arg(long, default_value_t = 4)]
        producers: usize,

        /// Override logging.format from the configuration file
        #[arg(long, value_enum)]
        log_format: Option<LogFormatArg>,
    },

    /// Validate configuration without starting the engine
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "matchd.yaml", env = "MATCHD_CONFIG")]
        config: PathBuf,
    },

    /// Initialize a new configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "matchd.yaml")]
        output: PathBuf,

        /// Symbol written into the new file
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human-readable, colored
    Pretty,

    /// One JSON object per line
    Json,

    /// Single-line human-readable
    Compact,
}

impl LogFormatArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormatArg::Pretty => "pretty",
            LogFormatArg::Json => "json",
            LogFormatArg::Compact => "compact",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
