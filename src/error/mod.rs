use crate::circuit_breaker::CircuitState;
use thiserror::Error;

/// Result type for breaker operations
pub type Result<T> = std::result::Result<T, BreakerError>;

/// Boxed cause carried by [`BreakerError::Execution`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Breaker error types
#[derive(Error, Debug)]
pub enum BreakerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error(
        "Circuit '{name}' is open: blocked after failure threshold reached \
         ({failure_threshold}), retry after {retry_after_ms} ms"
    )]
    Open {
        name: String,
        failure_threshold: u32,
        retry_after_ms: u64,
    },

    #[error("Execution failed while circuit '{name}' was {state}")]
    Execution {
        name: String,
        state: CircuitState,
        #[source]
        source: BoxError,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BreakerError {
    /// Whether the call was rejected without running the operation
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Whether the operation ran and failed
    pub fn is_execution(&self) -> bool {
        matches!(self, BreakerError::Execution { .. })
    }

    /// Whether this error came from configuration or validation
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            BreakerError::Config(_) | BreakerError::InvalidValue { .. } | BreakerError::Io(_)
        )
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        BreakerError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
