//! Conversational model provider
//!
//! Threads, messages, runs and identities behind one trait, with an
//! Assistants API implementation.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::AssistantProvider;
pub use error::{ProviderError, Resource};
pub use openai::AssistantsClient;
pub use types::{IdentitySpec, RunRequest, RunStatus, SchemaConstraint};

use crate::config::ProviderConfig;

/// Create the provider client described by config
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn AssistantProvider>, ProviderError> {
    debug!(base_url = %config.base_url, model = %config.model, "create_provider: called");
    Ok(Arc::new(AssistantsClient::from_config(config)?))
}
