//! Conversation Manager
//!
//! Each artifact keeps one provider conversation for its whole life. Edits
//! reuse it so the model keeps context; a regenerate starts over on a new one.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::HypothesisError;
use crate::domain::{Artifact, ArtifactUpdate};
use crate::pipeline::ThreadBinding;
use crate::provider::AssistantProvider;
use crate::state::Persistence;

/// Maps artifacts to conversation threads
pub struct ConversationManager {
    provider: Arc<dyn AssistantProvider>,
    store: Arc<dyn Persistence>,
}

impl ConversationManager {
    pub fn new(provider: Arc<dyn AssistantProvider>, store: Arc<dyn Persistence>) -> Self {
        Self { provider, store }
    }

    /// Thread an artifact runs on; `Fresh` when it has none bound
    pub fn resolve_thread(artifact: &Artifact) -> ThreadBinding<'_> {
        if artifact.conversation_thread_id.is_empty() {
            return ThreadBinding::Fresh;
        }
        ThreadBinding::Existing(&artifact.conversation_thread_id)
    }

    /// Create a new empty conversation
    pub async fn start_conversation(&self) -> Result<String, HypothesisError> {
        let thread_id = self.provider.create_conversation().await?;
        debug!(%thread_id, "start_conversation: created");
        Ok(thread_id)
    }

    /// Create a conversation and store it as the artifact's thread
    async fn bind_new_thread(&self, artifact: &Artifact) -> Result<String, HypothesisError> {
        let thread_id = self.start_conversation().await?;
        self.store
            .update_artifact(&artifact.id, &artifact.user_id, ArtifactUpdate::thread(&thread_id))
            .await?;
        info!(artifact_id = %artifact.id, %thread_id, "Bound artifact to new thread");
        Ok(thread_id)
    }

    /// Run `op` on the artifact's thread
    ///
    /// An artifact without a thread gets one bound first. When the provider
    /// no longer knows the thread, a replacement is created, stored on the
    /// artifact and `op` runs once more. Returns the result and the thread it
    /// ran on.
    pub async fn with_thread<T, F, Fut>(&self, artifact: &Artifact, mut op: F) -> Result<(T, String), HypothesisError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, HypothesisError>>,
    {
        debug!(artifact_id = %artifact.id, thread_id = %artifact.conversation_thread_id, "with_thread: called");
        let thread_id = match Self::resolve_thread(artifact) {
            ThreadBinding::Existing(thread_id) => thread_id.to_string(),
            ThreadBinding::Fresh => self.bind_new_thread(artifact).await?,
        };

        match op(thread_id.clone()).await {
            Err(HypothesisError::ThreadNotFound(lost)) => {
                warn!(artifact_id = %artifact.id, thread_id = %lost, "Conversation thread is gone, replacing it");
            }
            other => return other.map(|value| (value, thread_id)),
        }

        let replacement = self.bind_new_thread(artifact).await?;
        debug!(old = %thread_id, new = %replacement, "with_thread: replaced lost thread");

        match op(replacement.clone()).await {
            Ok(value) => Ok((value, replacement)),
            Err(HypothesisError::ThreadNotFound(lost)) => Err(HypothesisError::ProviderTransient(format!(
                "replacement thread {} was rejected as well",
                lost
            ))),
            Err(e) => Err(e),
        }
    }
}
