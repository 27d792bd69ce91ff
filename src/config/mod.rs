use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{BreakerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Breaker configuration
    #[serde(default)]
    pub breaker: BreakerSection,
    /// Demo workload configuration
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Named breaker definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSection {
    /// Name used in logs and metrics
    #[serde(default = "default_breaker_name")]
    pub name: String,
    /// Breaker thresholds and timeouts
    #[serde(flatten)]
    pub settings: CircuitBreakerConfig,
}

/// Simulated workload driven through a single breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Number of concurrent callers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Calls issued by each caller
    #[serde(default = "default_requests")]
    pub requests: usize,
    /// Probability in [0, 1] that the simulated dependency fails
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    /// Pause between calls from the same caller, in milliseconds
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Simulated work per call, in milliseconds
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,
}

fn default_breaker_name() -> String {
    "downstream".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_requests() -> usize {
    20
}

fn default_failure_rate() -> f64 {
    0.2
}

fn default_request_interval_ms() -> u64 {
    50
}

fn default_work_ms() -> u64 {
    100
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            name: default_breaker_name(),
            settings: CircuitBreakerConfig::default(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            requests: default_requests(),
            failure_rate: default_failure_rate(),
            request_interval_ms: default_request_interval_ms(),
            work_ms: default_work_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BreakerError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BreakerError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.breaker.name.trim().is_empty() {
            return Err(BreakerError::Config(
                "Breaker name cannot be empty".to_string(),
            ));
        }

        self.breaker.settings.validate()?;

        if self.demo.workers == 0 {
            return Err(BreakerError::Config(
                "Demo workers must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.demo.failure_rate) {
            return Err(BreakerError::Config(format!(
                "Demo failure_rate must be within [0, 1], got {}",
                self.demo.failure_rate
            )));
        }

        Ok(())
    }
}
