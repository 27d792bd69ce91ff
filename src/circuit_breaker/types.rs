use crate::error::{BreakerError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is open, requests are rejected
    Open = 1,
    /// Circuit is half-open, a single trial request is in flight
    HalfOpen = 2,
}

impl CircuitState {
    /// Decode a value stored in the breaker's atomic state cell.
    pub(crate) fn from_u8(value: u8) -> Self {
        // Only the three discriminants are ever stored.
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Lowercase label used for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Initial time to wait in open state before allowing a trial request
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,

    /// Upper bound for retry backoff, as a multiple of `retry_timeout_ms`
    #[serde(default = "default_max_retry_factor")]
    pub max_retry_factor: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_retry_timeout_ms() -> u64 {
    1000
}

fn default_max_retry_factor() -> u32 {
    8
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            retry_timeout_ms: default_retry_timeout_ms(),
            max_retry_factor: default_max_retry_factor(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(BreakerError::invalid(
                "failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.retry_timeout_ms == 0 {
            return Err(BreakerError::invalid(
                "retry_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self
            .retry_timeout_ms
            .checked_mul(u64::from(self.max_retry_factor))
            .is_none()
        {
            return Err(BreakerError::invalid(
                "max_retry_factor",
                format!(
                    "{} x {} ms overflows the maximum retry timeout",
                    self.max_retry_factor, self.retry_timeout_ms
                ),
            ));
        }
        Ok(())
    }

    /// Largest retry timeout backoff can reach.
    ///
    /// A factor of 0 or 1 pins the timeout at its base value.
    pub fn max_retry_timeout_ms(&self) -> u64 {
        self.retry_timeout_ms
            .saturating_mul(u64::from(self.max_retry_factor.max(1)))
    }
}

/// Circuit breaker metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    /// State at the time of the snapshot
    pub state: CircuitState,
    /// Failures recorded since the last success
    pub consecutive_failures: u64,
    /// Current wait before the next trial request, in milliseconds
    pub current_retry_timeout_ms: u64,
    /// Requests admitted by the gate
    pub allowed_requests: u64,
    /// Requests rejected by the gate
    pub rejected_requests: u64,
    /// Recorded successes
    pub successful_requests: u64,
    /// Recorded failures
    pub failed_requests: u64,
    /// Number of times circuit opened
    pub circuit_opened_count: u64,
    /// Number of times circuit half-opened
    pub circuit_half_opened_count: u64,
    /// Number of times circuit closed
    pub circuit_closed_count: u64,
}

/// Lifetime counters behind [`CircuitBreakerMetrics`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub allowed: AtomicU64,
    pub rejected: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub opened: AtomicU64,
    pub half_opened: AtomicU64,
    pub closed: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "Closed");
        assert_eq!(CircuitState::Open.to_string(), "Open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HalfOpen");
    }

    #[test]
    fn test_circuit_state_encoding() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            assert_eq!(CircuitState::from_u8(state as u8), state);
        }
        assert_eq!(CircuitState::HalfOpen.as_label(), "half_open");
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.retry_timeout_ms, 1000);
        assert_eq!(config.max_retry_factor, 8);
        assert_eq!(config.max_retry_timeout_ms(), 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_factor_pins_max_to_base() {
        let config = CircuitBreakerConfig {
            max_retry_factor: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retry_timeout_ms(), 1000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CircuitBreakerConfig {
            retry_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CircuitBreakerConfig {
            retry_timeout_ms: u64::MAX / 2,
            max_retry_factor: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
