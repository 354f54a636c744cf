//! Orchestration error taxonomy
//!
//! Lower layers have their own error enums; everything surfaced to callers of
//! the orchestrator is a [`HypothesisError`].

use std::time::Duration;
use thiserror::Error;

use crate::pipeline::ExtractError;
use crate::provider::{ProviderError, Resource};
use crate::state::StateError;

/// Errors surfaced by the orchestration core
#[derive(Debug, Error)]
pub enum HypothesisError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Run {run_id} on thread {thread_id} was still unfinished after {elapsed:?}; the operation can be retried")]
    ProviderTimeout {
        thread_id: String,
        run_id: String,
        elapsed: Duration,
    },

    #[error("Transient provider error: {0}")]
    ProviderTransient(String),

    #[error("Provider rejected the request: {0}")]
    ProviderFailed(String),

    #[error(
        "Identity migration failed for project {project_id} (token {token:?}): {reason}. \
         Retry the operation; if it keeps failing the project has to be recreated"
    )]
    IdentityMigration {
        project_id: String,
        token: Option<String>,
        reason: String,
    },

    #[error("Provider identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Conversation thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),
}

impl HypothesisError {
    /// Whether the caller may retry the whole operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HypothesisError::ProviderTimeout { .. } | HypothesisError::ProviderTransient(_)
        )
    }
}

impl From<ProviderError> for HypothesisError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound {
                resource: Resource::Thread,
                id,
            } => HypothesisError::ThreadNotFound(id),
            ProviderError::NotFound {
                resource: Resource::Identity,
                id,
            } => HypothesisError::IdentityNotFound(id),
            ProviderError::NotFound { resource, id } => HypothesisError::NotFound(format!("provider {} {}", resource, id)),
            transient if transient.is_retryable() => HypothesisError::ProviderTransient(transient.to_string()),
            ProviderError::ApiError { status, message } => {
                HypothesisError::ProviderFailed(format!("{}: {}", status, message))
            }
            ProviderError::InvalidResponse(msg) => HypothesisError::SchemaValidation(msg),
            ProviderError::Json(e) => HypothesisError::SchemaValidation(e.to_string()),
            other => HypothesisError::ProviderTransient(other.to_string()),
        }
    }
}

impl From<StateError> for HypothesisError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => HypothesisError::NotFound(what),
            other => HypothesisError::Store(other.to_string()),
        }
    }
}

impl From<ExtractError> for HypothesisError {
    fn from(err: ExtractError) -> Self {
        HypothesisError::SchemaValidation(err.to_string())
    }
}
