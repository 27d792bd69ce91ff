use super::breaker::CircuitBreaker;
use super::clock::{Clock, SystemClock};
use super::types::CircuitBreakerConfig;
use crate::error::{BreakerError, Result};
use std::sync::Arc;

/// Fluent builder for [`CircuitBreaker`].
///
/// Setters validate eagerly and return an error for out-of-range input, so
/// a bad value is reported where it is supplied rather than at first use.
/// Defaults: threshold 5, retry timeout 1000 ms, max retry factor 8.
#[derive(Debug, Clone)]
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerBuilder {
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            config: CircuitBreakerConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: CircuitBreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Consecutive failures that open the circuit; must be greater than 0
    pub fn with_failure_threshold(mut self, threshold: u32) -> Result<Self> {
        if threshold == 0 {
            return Err(BreakerError::invalid(
                "failure_threshold",
                "must be greater than 0",
            ));
        }
        self.config.failure_threshold = threshold;
        self.revalidate()?;
        Ok(self)
    }

    /// Initial open-state wait before a trial request; must be greater than 0
    pub fn with_retry_timeout_millis(mut self, retry_timeout_ms: u64) -> Result<Self> {
        if retry_timeout_ms == 0 {
            return Err(BreakerError::invalid(
                "retry_timeout_ms",
                "must be greater than 0",
            ));
        }
        self.config.retry_timeout_ms = retry_timeout_ms;
        self.revalidate()?;
        Ok(self)
    }

    /// Backoff cap as a multiple of the retry timeout
    pub fn with_max_retry_factor(mut self, factor: u32) -> Result<Self> {
        self.config.max_retry_factor = factor;
        self.revalidate()?;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn build(self) -> Result<CircuitBreaker> {
        CircuitBreaker::with_clock(self.name, self.config, self.clock)
    }

    fn revalidate(&self) -> Result<()> {
        self.config.validate()
    }
}
