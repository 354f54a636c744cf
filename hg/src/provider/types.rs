//! Provider request/response types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of one provider-side run, as reported by a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    /// Terminal failure with the provider's reason
    Failed(String),
}

impl RunStatus {
    /// Map the provider's raw status string
    ///
    /// Anything that is not queued, in progress or completed ends the run:
    /// the pipeline never submits tools, so `requires_action` is a failure too.
    pub fn from_provider(status: &str, reason: Option<String>) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" | "cancelling" => Self::Running,
            "completed" => Self::Completed,
            other => Self::Failed(reason.unwrap_or_else(|| format!("run ended with status '{}'", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Strict structural constraint the provider must honour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConstraint {
    /// Schema name reported to the provider
    pub name: String,
    /// JSON schema the output must validate against
    pub schema: Value,
    /// Strict mode: the provider refuses to emit non-conforming output
    pub strict: bool,
}

/// Parameters of one run trigger
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunRequest {
    pub schema: Option<SchemaConstraint>,
    pub max_tokens: u32,
    pub additional_instructions: Option<String>,
}

/// Configuration for creating a provider identity
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySpec {
    pub name: String,
    pub instructions: String,
}
