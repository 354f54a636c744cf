//! Provider error types

use std::time::Duration;
use thiserror::Error;

/// Provider-side resource a not-found error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Thread,
    Run,
    Identity,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thread => write!(f, "thread"),
            Self::Run => write!(f, "run"),
            Self::Identity => write!(f, "identity"),
        }
    }
}

/// Errors that can occur while talking to the provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Provider {resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status, .. } => *status == 408 || *status >= 500,
            ProviderError::NotFound { .. } => false,
            ProviderError::Network(_) => true,
            ProviderError::Timeout(_) => true,
            ProviderError::InvalidResponse(_) => false,
            ProviderError::Json(_) => false,
        }
    }

    /// Check if this is a not-found error for the given resource
    pub fn is_not_found(&self, resource: Resource) -> bool {
        matches!(self, ProviderError::NotFound { resource: r, .. } if *r == resource)
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            ProviderError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );

        assert!(
            ProviderError::ApiError {
                status: 502,
                message: "Bad gateway".to_string()
            }
            .is_retryable()
        );

        assert!(
            ProviderError::ApiError {
                status: 408,
                message: "Request timeout".to_string()
            }
            .is_retryable()
        );

        assert!(
            !ProviderError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );

        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!ProviderError::InvalidResponse("Bad JSON".to_string()).is_retryable());
        assert!(
            !ProviderError::NotFound {
                resource: Resource::Thread,
                id: "thread_1".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_is_not_found() {
        let err = ProviderError::NotFound {
            resource: Resource::Identity,
            id: "asst_1".to_string(),
        };
        assert!(err.is_not_found(Resource::Identity));
        assert!(!err.is_not_found(Resource::Thread));
    }

    #[test]
    fn test_retry_after() {
        let err = ProviderError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert!(err.is_rate_limit());
    }
}
