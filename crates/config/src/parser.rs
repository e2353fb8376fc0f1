use crate::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MatchingConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Config file content length: {} bytes", content.len());
    parse_config(&content)
}

/// Parse configuration text after environment substitution
pub fn parse_config(content: &str) -> Result<MatchingConfig, ConfigError> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: MatchingConfig = serde_yaml::from_str(&substituted)?;

    info!(symbol = %config.engine.symbol, "Configuration loaded successfully");
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> MatchingConfig {
    MatchingConfig {
        engine: EngineSection::default(),
        logging: LoggingSection::default(),
        metrics: MetricsSection::default(),
    }
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(
    config: &MatchingConfig,
    path: P,
) -> Result<(), ConfigError> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)?;

    fs::write(path, yaml).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Configuration saved successfully");
    Ok(())
}
