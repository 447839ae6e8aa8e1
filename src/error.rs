use thiserror::Error;

use crate::network::ElementRef;

pub type Result<T, E = SimError> = std::result::Result<T, E>;

/// Everything the simulator can fail with.
///
/// `InvalidTarget` and `InvalidRequest` are recoverable when raised by an agent
/// mid-step (they become logged anomalies). The rest abort the run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("capacity violation on {element}: utilization {utilization} exceeds effective capacity {capacity}")]
    CapacityViolation {
        element: ElementRef,
        utilization: u64,
        capacity: u64,
    },

    #[error("engine is {0}, no further steps can run")]
    EngineState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// True for errors an agent step may swallow as an anomaly.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidTarget(_) | Self::InvalidRequest(_))
    }
}
