//! Engine error taxonomy

use thiserror::Error;

/// Errors surfaced by the supervision engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown profile, key list, module or otherwise unusable configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No free key left in a key list
    #[error("no available key in list '{0}'")]
    ResourceExhausted(String),

    /// An OS call (open, allocate, protect, write, spawn) failed
    #[error("OS operation failed: {0}")]
    OsOperationFailed(String),

    /// Launch failure, unexpected exit or heartbeat timeout
    #[error("process lifecycle error: {0}")]
    ProcessLifecycle(String),

    /// The requested transition is not valid from the current state
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// The profile or key store failed
    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl EngineError {
    /// Short machine readable code, used in status text and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::OsOperationFailed(_) => "OS_OPERATION_FAILED",
            Self::ProcessLifecycle(_) => "PROCESS_LIFECYCLE",
            Self::StateConflict(_) => "STATE_CONFLICT",
            Self::Persistence(_) => "PERSISTENCE",
        }
    }

    pub fn unknown_profile(name: &str) -> Self {
        Self::Configuration(format!("unknown profile '{}'", name))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
