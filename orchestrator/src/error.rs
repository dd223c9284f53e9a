//! Orchestrator-specific error types

use shared::{Capability, ContentVersion, ProviderId, SessionPurpose, SharedError, Stage, WorkItemId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Transient provider failure from {provider}: {message}")]
    TransientProvider { provider: ProviderId, message: String },

    #[error("Permanent provider failure from {provider}: {message}")]
    PermanentProvider { provider: ProviderId, message: String },

    #[error("Queue saturated for {step} (depth {depth})")]
    QueueSaturated { step: String, depth: usize },

    #[error("Session pool exhausted for {purpose} after {waited:?}")]
    PoolExhausted { purpose: SessionPurpose, waited: Duration },

    #[error("No provider available for {capability}")]
    NoProviderAvailable { capability: Capability },

    #[error("All providers exhausted for {capability} after {tried} attempts: {last_error}")]
    AllProvidersExhausted {
        capability: Capability,
        tried: usize,
        last_error: String,
    },

    #[error("Detection budget exhausted after {attempts} attempts (last score {last_score:.1}, threshold {threshold:.1})")]
    DetectionBudgetExhausted {
        attempts: u32,
        last_score: f64,
        threshold: f64,
    },

    #[error("Work item {id} was cancelled")]
    Cancelled { id: WorkItemId },

    #[error("Work item not found: {id}")]
    WorkItemNotFound { id: WorkItemId },

    #[error("Invalid transition {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("Work item {id} is terminal ({stage}) and cannot change")]
    TerminalItemImmutable { id: WorkItemId, stage: Stage },

    #[error("Work item {id} has no {version} content")]
    MissingContent { id: WorkItemId, version: ContentVersion },

    #[error("Configuration error: {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Repository error: {message}")]
    Repository { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Whether a local retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OrchestratorError::TransientProvider { .. }
                | OrchestratorError::PoolExhausted { .. }
                | OrchestratorError::NoProviderAvailable { .. }
                | OrchestratorError::Session { .. }
        )
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Error returned by external adapters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Rate limited, unavailable or otherwise retryable
    #[error("transient: {0}")]
    Transient(String),

    /// Auth or configuration problem; retrying the same adapter is pointless
    #[error("permanent: {0}")]
    Permanent(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The automation session itself broke, e.g. a crashed page or a blocked profile
    #[error("session: {0}")]
    Session(String),
}

impl AdapterError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, AdapterError::Permanent(_))
    }

    /// Classify into the orchestrator taxonomy for the given provider
    pub fn into_provider_error(self, provider: ProviderId) -> OrchestratorError {
        match self {
            AdapterError::Permanent(message) => OrchestratorError::PermanentProvider { provider, message },
            other => OrchestratorError::TransientProvider {
                provider,
                message: other.to_string(),
            },
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
