//! Prompt Template System
//!
//! The orchestration core only asks a [`PromptBuilder`] for instruction
//! text; wording lives in `.pmt` templates rendered with Handlebars.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (override)
//! 2. Embedded fallback in code

pub mod embedded;
mod loader;

pub use loader::PromptLoader;

use eyre::Result;
use serde::Serialize;
use tracing::debug;

/// Named block of text (name plus description) shown to the model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Subject {
    pub name: String,
    pub description: String,
}

/// An already generated artifact given as context
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriorArtifact {
    pub kind: String,
    /// Pretty-printed JSON content
    pub content: String,
}

/// Context for the first generation of an artifact
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArtifactPrompt {
    pub kind: String,
    pub hypothesis_title: String,
    pub hypothesis_description: String,
    pub prior: Vec<PriorArtifact>,
    /// Detailed channels only
    pub segment: Option<Subject>,
    /// Detailed channels only
    pub channel: Option<Subject>,
}

/// Context for a model-driven change
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChangePrompt {
    pub kind: String,
    /// Current content including stable ids
    pub current: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfilePrompt {
    pub hypothesis_title: String,
    pub hypothesis_description: String,
    pub segment_name: String,
    pub segment_description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContentIdeaPrompt {
    pub channel_name: String,
    pub segment_name: String,
    pub existing_titles: Vec<String>,
    pub hint: Option<String>,
}

/// Builds the instruction text for every kind of generation turn
pub trait PromptBuilder: Send + Sync {
    fn artifact(&self, context: &ArtifactPrompt) -> Result<String>;

    fn change(&self, context: &ChangePrompt) -> Result<String>;

    fn person_profile(&self, context: &ProfilePrompt) -> Result<String>;

    fn content_idea(&self, context: &ContentIdeaPrompt) -> Result<String>;

    /// Default identity instructions for a project
    fn identity_instructions(&self, project_title: &str) -> Result<String>;
}

/// PromptBuilder backed by `.pmt` templates
pub struct TemplatePrompts {
    loader: PromptLoader,
}

impl TemplatePrompts {
    pub fn new(loader: PromptLoader) -> Self {
        Self { loader }
    }

    pub fn embedded() -> Self {
        Self::new(PromptLoader::embedded_only())
    }
}

impl PromptBuilder for TemplatePrompts {
    fn artifact(&self, context: &ArtifactPrompt) -> Result<String> {
        debug!(kind = %context.kind, prior = context.prior.len(), "TemplatePrompts::artifact: called");
        self.loader.render("artifact", context)
    }

    fn change(&self, context: &ChangePrompt) -> Result<String> {
        debug!(kind = %context.kind, "TemplatePrompts::change: called");
        self.loader.render("change", context)
    }

    fn person_profile(&self, context: &ProfilePrompt) -> Result<String> {
        debug!(segment = %context.segment_name, "TemplatePrompts::person_profile: called");
        self.loader.render("person-profile", context)
    }

    fn content_idea(&self, context: &ContentIdeaPrompt) -> Result<String> {
        debug!(channel = %context.channel_name, "TemplatePrompts::content_idea: called");
        self.loader.render("content-idea", context)
    }

    fn identity_instructions(&self, project_title: &str) -> Result<String> {
        debug!(%project_title, "TemplatePrompts::identity_instructions: called");
        self.loader
            .render("identity", &serde_json::json!({ "project_title": project_title }))
    }
}
