//! Circuit breaker for the matching engine
//!
//! The breaker has two states and one transition: `Running -> Halted`.
//! A halt is terminal for the engine instance; trading resumes only after an
//! operator restarts the process and replays history.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Running,
    Halted,
}

const RUNNING: u8 = 0;
const HALTED: u8 = 1;

#[derive(Debug)]
struct HaltRecord {
    reason: String,
    at: DateTime<Utc>,
}

/// One-way halt switch shared by the engine handle and the worker
#[derive(Debug)]
pub struct CircuitBreaker {
    symbol: String,
    state: AtomicU8,
    record: OnceLock<HaltRecord>,
}

impl CircuitBreaker {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            state: AtomicU8::new(RUNNING),
            record: OnceLock::new(),
        }
    }

    /// Transition to `Halted`
    ///
    /// Returns true for the single call that performed the transition; every
    /// later call is a no-op returning false.
    pub fn halt(&self, reason: impl Into<String>) -> bool {
        if self
            .state
            .compare_exchange(RUNNING, HALTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let reason = reason.into();
        error!(symbol = %self.symbol, %reason, "Matching engine HALTED");
        ::metrics::counter!("matching_engine_halts_total", "symbol" => self.symbol.clone()).increment(1);
        let _ = self.record.set(HaltRecord {
            reason,
            at: Utc::now(),
        });
        true
    }

    /// Lock-free state check
    pub fn is_halted(&self) -> bool {
        self.state.load(Ordering::Acquire) == HALTED
    }

    pub fn state(&self) -> EngineState {
        if self.is_halted() {
            EngineState::Halted
        } else {
            EngineState::Running
        }
    }

    /// Why the engine halted, once the halt has been recorded
    pub fn halt_reason(&self) -> Option<&str> {
        self.record.get().map(|r| r.reason.as_str())
    }

    /// When the engine halted
    pub fn halted_at(&self) -> Option<DateTime<Utc>> {
        self.record.get().map(|r| r.at)
    }

    /// Status for operational endpoints
    pub fn status(&self) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            symbol: self.symbol.clone(),
            state: self.state(),
            reason: self.halt_reason().map(str::to_string),
            halted_at: self.halted_at(),
        }
    }
}

/// Status information for the circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStatus {
    pub symbol: String,
    pub state: EngineState,
    pub reason: Option<String>,
    pub halted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_running() {
        let breaker = CircuitBreaker::new("BTCUSDT");
        assert!(!breaker.is_halted());
        assert_eq!(breaker.state(), EngineState::Running);
        assert!(breaker.halt_reason().is_none());
    }

    #[test]
    fn test_halt_is_idempotent() {
        let breaker = CircuitBreaker::new("BTCUSDT");
        assert!(breaker.halt("journal write failed"));
        assert!(!breaker.halt("second reason"));

        assert!(breaker.is_halted());
        assert_eq!(breaker.halt_reason(), Some("journal write failed"));
        assert!(breaker.halted_at().is_some());
    }

    #[test]
    fn test_concurrent_halt_transitions_once() {
        let breaker = Arc::new(CircuitBreaker::new("BTCUSDT"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || breaker.halt(format!("caller {i}")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(breaker.status().state, EngineState::Halted);
    }
}
