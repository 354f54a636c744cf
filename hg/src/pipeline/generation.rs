//! Schema-constrained generation over a conversation thread

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::extract::extract_json;
use super::run::{PollPolicy, RunPoller, Sleeper};
use crate::HypothesisError;
use crate::provider::{AssistantProvider, RunRequest};
use crate::schema::OutputSchema;

/// Which conversation a generation turn runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadBinding<'a> {
    /// Continue the artifact's own conversation
    Existing(&'a str),
    /// Start a new conversation; its id becomes the artifact's binding
    Fresh,
}

/// One generation turn
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub schema: OutputSchema,
    pub instruction: &'a str,
    pub identity_id: &'a str,
    pub max_tokens: u32,
    /// Run-level instruction appended to the identity's own for this turn
    pub extra: Option<&'a str>,
}

/// Validated output of a turn and the thread it ran on
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub content: T,
    pub thread_id: String,
}

/// Post, run, poll, read back, extract, validate
pub struct GenerationPipeline {
    provider: Arc<dyn AssistantProvider>,
    poller: RunPoller,
}

impl GenerationPipeline {
    pub fn new(provider: Arc<dyn AssistantProvider>, policy: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        let poller = RunPoller::new(provider.clone(), policy, sleeper);
        Self { provider, poller }
    }

    /// Run one turn and return the payload, already schema-validated
    ///
    /// Callers map it through the typed allow-list for their output kind.
    pub async fn generate(
        &self,
        request: &GenerationRequest<'_>,
        binding: ThreadBinding<'_>,
    ) -> Result<Generated<Value>, HypothesisError> {
        debug!(schema = %request.schema.name(), ?binding, "generate: called");

        let thread_id = match binding {
            ThreadBinding::Existing(thread_id) => thread_id.to_string(),
            ThreadBinding::Fresh => {
                let thread_id = self.provider.create_conversation().await?;
                debug!(%thread_id, "generate: created conversation");
                thread_id
            }
        };

        self.provider.post_message(&thread_id, request.instruction).await?;

        let run_request = RunRequest {
            schema: Some(request.schema.constraint()),
            max_tokens: request.max_tokens,
            additional_instructions: request.extra.map(str::to_string),
        };
        let run_id = self
            .provider
            .trigger_run(&thread_id, request.identity_id, &run_request)
            .await?;
        debug!(%thread_id, %run_id, "generate: run triggered");

        self.poller.await_run(&thread_id, &run_id).await?;

        let reply = self.provider.get_latest_message(&thread_id).await?;
        let value = extract_json(&reply)?;
        request.schema.validate(&value)?;

        info!(schema = %request.schema.name(), %thread_id, "Generated structured output");
        Ok(Generated {
            content: value,
            thread_id,
        })
    }
}
