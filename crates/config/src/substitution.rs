use crate::ConfigError;
use regex::{Captures, Regex};
use std::env;
use tracing::{debug, warn};

/// `${VAR}` or `${VAR:-fallback}`
const PLACEHOLDER: &str = r"\$\{(\w+)(?::-([^}]*))?\}";

/// Substitute environment variables written as `${VAR_NAME}`
///
/// `${VAR_NAME:-fallback}` uses `fallback` when the variable is unset.
/// Placeholders for unset variables without a fallback are left in place;
/// the validator reports them.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(PLACEHOLDER)?;
    let mut missing_vars = Vec::new();

    let result = re.replace_all(content, |caps: &Captures<'_>| {
        let var_name = &caps[1];
        match (env::var(var_name), caps.get(2)) {
            (Ok(value), _) => {
                debug!("Substituting environment variable: {} = \"{}\"", var_name, value);
                value
            }
            (Err(_), Some(fallback)) => {
                debug!("Environment variable '{}' not set, using fallback", var_name);
                fallback.as_str().to_string()
            }
            (Err(_), None) => {
                warn!("Environment variable '{}' not set", var_name);
                missing_vars.push(var_name.to_string());
                caps[0].to_string()
            }
        }
    });

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (will fail validation): {:?}",
            missing_vars
        );
    }

    Ok(result.into_owned())
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    Regex::new(PLACEHOLDER)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_set_variable() {
        env::set_var("MATCHD_TEST_SYMBOL", "SOLUSDT");
        let out = substitute_env_vars("symbol: ${MATCHD_TEST_SYMBOL}").unwrap();
        assert_eq!(out, "symbol: SOLUSDT");
    }

    #[test]
    fn test_fallback_used_when_unset() {
        env::remove_var("MATCHD_TEST_UNSET_PORT");
        let out = substitute_env_vars("port: ${MATCHD_TEST_UNSET_PORT:-9100}").unwrap();
        assert_eq!(out, "port: 9100");
    }

    #[test]
    fn test_unset_without_fallback_is_kept() {
        env::remove_var("MATCHD_TEST_MISSING");
        let out = substitute_env_vars("symbol: ${MATCHD_TEST_MISSING}").unwrap();
        assert_eq!(out, "symbol: ${MATCHD_TEST_MISSING}");
        assert!(has_unresolved_env_vars(&out));
        assert!(!has_unresolved_env_vars("symbol: BTCUSDT"));
    }
}
