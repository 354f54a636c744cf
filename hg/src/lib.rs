//! hypogen - conversation-driven business hypothesis generator
//!
//! Turns a business hypothesis into a set of planning artifacts (lean
//! canvas, market research, validation plan, landing copy, go-to-market plan
//! and per-channel detail) by driving a stateful assistant provider through
//! schema-constrained runs.
//!
//! # Core Concepts
//!
//! - **One thread per artifact**: edits continue the artifact's own
//!   conversation; a regenerate starts a new one
//! - **Strict schemas**: every run is constrained to a JSON schema and its
//!   output is validated before it is stored
//! - **Stable ids**: nested items keep their ids across edits
//!
//! # Modules
//!
//! - [`orchestrator`] - generate, regenerate and amend artifacts
//! - [`pipeline`] - one schema-constrained generation turn and run polling
//! - [`merge`] - id-preserving reconciliation of nested collections
//! - [`identity`] - provider identity migration and repair
//! - [`conversation`] - artifact to thread binding
//! - [`provider`] - provider trait and the Assistants API client
//! - [`state`] - persistence boundary and the actor-backed store
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod error;
pub mod identity;
pub mod locks;
pub mod merge;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod schema;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use domain::{Artifact, ArtifactContent, ArtifactKey, ArtifactKind, Hypothesis, PersonProfile, Project};
pub use error::HypothesisError;
pub use orchestrator::{AmendRequest, Orchestrator, PersonProfileJob, ProfileJobSink, ProfileQueue, Services};
pub use provider::{AssistantProvider, AssistantsClient, ProviderError, create_provider};
pub use state::{Persistence, StateManager};
