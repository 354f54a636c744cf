//! AssistantProvider trait definition

use async_trait::async_trait;

use super::{IdentitySpec, ProviderError, RunRequest, RunStatus};

/// Stateful conversational provider
///
/// Unlike a plain completion API, the provider keeps conversation state:
/// threads accumulate messages, runs execute asynchronously against a thread
/// using a reusable identity (persona), and results are read back from the
/// thread once the run completes.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    /// Create a new, empty conversation thread
    async fn create_conversation(&self) -> Result<String, ProviderError>;

    /// Append a user message to a thread
    async fn post_message(&self, thread_id: &str, text: &str) -> Result<(), ProviderError>;

    /// Start a run of `identity_id` over the thread, returning the run id
    async fn trigger_run(&self, thread_id: &str, identity_id: &str, request: &RunRequest)
    -> Result<String, ProviderError>;

    /// Query the status of a run
    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, ProviderError>;

    /// Text of the most recent message in the thread
    async fn get_latest_message(&self, thread_id: &str) -> Result<String, ProviderError>;

    /// Create an identity with the given configuration, returning its token
    async fn create_identity(&self, spec: &IdentitySpec) -> Result<String, ProviderError>;

    /// Instructions of an identity, `None` if the provider does not know it
    async fn get_identity(&self, identity_id: &str) -> Result<Option<String>, ProviderError>;

    /// Replace the instructions of an existing identity
    async fn update_identity(&self, identity_id: &str, instructions: &str) -> Result<(), ProviderError>;
}
