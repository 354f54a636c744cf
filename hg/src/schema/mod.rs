//! Strict output schemas
//!
//! One JSON schema per kind of model output. The same schema is sent to the
//! provider as a strict response constraint and used to validate whatever
//! comes back before the typed structs ever see it.

use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::HypothesisError;
use crate::domain::{ArtifactContent, ArtifactKind};
use crate::provider::SchemaConstraint;

/// Every kind of structured output the model is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    Artifact(ArtifactKind),
    PersonProfile,
    /// A single content idea for a detailed channel
    ContentIdea,
}

impl OutputSchema {
    /// Schema name reported to the provider
    pub fn name(&self) -> &'static str {
        match self {
            Self::Artifact(kind) => kind.label(),
            Self::PersonProfile => "person-profile",
            Self::ContentIdea => "content-idea",
        }
    }

    /// The JSON schema document
    pub fn definition(&self) -> Value {
        match self {
            Self::Artifact(ArtifactKind::Core) => core_schema(),
            Self::Artifact(ArtifactKind::MarketResearch) => market_research_schema(),
            Self::Artifact(ArtifactKind::Validation) => validation_schema(),
            Self::Artifact(ArtifactKind::Packing) => packing_schema(),
            Self::Artifact(ArtifactKind::Gtm) => gtm_schema(),
            Self::Artifact(ArtifactKind::GtmDetailedChannel) => detailed_channel_schema(),
            Self::PersonProfile => person_profile_schema(),
            Self::ContentIdea => content_idea_schema(),
        }
    }

    /// Strict constraint for a run request
    pub fn constraint(&self) -> SchemaConstraint {
        SchemaConstraint {
            name: self.name().to_string(),
            schema: self.definition(),
            strict: true,
        }
    }

    /// Validate an instance, listing every offending instance path
    pub fn validate(&self, instance: &Value) -> Result<(), HypothesisError> {
        debug!(schema = %self.name(), "validate: called");
        let definition = self.definition();
        let compiled = JSONSchema::compile(&definition)
            .map_err(|e| HypothesisError::SchemaValidation(format!("schema {} does not compile: {}", self.name(), e)))?;

        if let Err(errors) = compiled.validate(instance) {
            let problems: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_string() } else { path };
                    format!("{}: {}", path, e)
                })
                .collect();
            debug!(schema = %self.name(), count = problems.len(), "validate: instance rejected");
            return Err(HypothesisError::SchemaValidation(format!(
                "{} output does not match its schema: {}",
                self.name(),
                problems.join("; ")
            )));
        }
        Ok(())
    }

    /// Validate, then map through the typed allow-list
    pub fn parse<T: DeserializeOwned>(&self, instance: Value) -> Result<T, HypothesisError> {
        self.validate(&instance)?;
        serde_json::from_value(instance)
            .map_err(|e| HypothesisError::SchemaValidation(format!("{} output is malformed: {}", self.name(), e)))
    }
}

/// Validate an artifact payload and map it to typed content
pub fn parse_artifact(kind: ArtifactKind, instance: Value) -> Result<ArtifactContent, HypothesisError> {
    OutputSchema::Artifact(kind).validate(&instance)?;
    ArtifactContent::from_value(kind, instance)
        .map_err(|e| HypothesisError::SchemaValidation(format!("{} output is malformed: {}", kind, e)))
}

fn string() -> Value {
    json!({ "type": "string" })
}

fn boolean() -> Value {
    json!({ "type": "boolean" })
}

fn integer() -> Value {
    json!({ "type": "integer" })
}

/// Stable id slot: the model echoes ids it was shown and leaves new items null
fn nullable_id() -> Value {
    json!({ "type": ["string", "null"] })
}

fn string_enum(values: &[&str]) -> Value {
    json!({ "type": "string", "enum": values })
}

fn array(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

fn strings() -> Value {
    array(string())
}

/// Closed object: every property required, nothing else allowed
fn object(properties: Vec<(&str, Value)>) -> Value {
    let required: Vec<Value> = properties.iter().map(|(name, _)| json!(name)).collect();
    let properties: Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn core_schema() -> Value {
    object(vec![
        ("problems", strings()),
        (
            "customerSegments",
            array(object(vec![
                ("id", nullable_id()),
                ("name", string()),
                ("description", string()),
            ])),
        ),
        ("uniqueValueProposition", string()),
        ("solutions", strings()),
        ("channels", strings()),
        ("revenueStreams", strings()),
        ("costStructure", strings()),
        ("keyMetrics", strings()),
        ("unfairAdvantage", string()),
    ])
}

fn market_research_schema() -> Value {
    object(vec![
        (
            "marketSize",
            object(vec![("tam", string()), ("sam", string()), ("som", string())]),
        ),
        (
            "trends",
            array(object(vec![("name", string()), ("description", string())])),
        ),
        (
            "competitors",
            array(object(vec![
                ("name", string()),
                ("description", string()),
                ("strengths", strings()),
                ("weaknesses", strings()),
            ])),
        ),
        ("opportunities", strings()),
        ("risks", strings()),
    ])
}

fn validation_schema() -> Value {
    object(vec![
        ("assumptions", strings()),
        ("interviewQuestions", strings()),
        (
            "experiments",
            array(object(vec![
                ("name", string()),
                ("description", string()),
                ("successCriteria", string()),
            ])),
        ),
        ("channels", strings()),
    ])
}

fn packing_schema() -> Value {
    object(vec![
        ("headline", string()),
        ("subheadline", string()),
        (
            "benefits",
            array(object(vec![("title", string()), ("description", string())])),
        ),
        ("callToAction", string()),
        ("socialProof", strings()),
    ])
}

fn gtm_stage() -> Value {
    object(vec![
        ("goal", string()),
        (
            "channels",
            array(object(vec![
                ("id", nullable_id()),
                ("name", string()),
                ("description", string()),
                ("status", string_enum(&["Planned", "InProgress", "Completed"])),
                ("kpis", string()),
            ])),
        ),
    ])
}

fn gtm_schema() -> Value {
    object(vec![
        ("validate", gtm_stage()),
        ("buildAudience", gtm_stage()),
        ("scale", gtm_stage()),
    ])
}

fn task() -> Value {
    object(vec![
        ("id", nullable_id()),
        ("text", string()),
        ("completed", boolean()),
    ])
}

fn content_idea_schema() -> Value {
    object(vec![
        ("id", nullable_id()),
        ("title", string()),
        ("description", string()),
    ])
}

fn detailed_channel_schema() -> Value {
    object(vec![
        ("preparationTasks", array(task())),
        ("contentIdeas", array(content_idea_schema())),
        (
            "actionPlan",
            array(object(vec![
                ("id", nullable_id()),
                ("title", string()),
                ("description", string()),
                ("tasks", array(task())),
            ])),
        ),
        (
            "metricsAndKpis",
            array(object(vec![
                ("id", nullable_id()),
                ("metric", string()),
                ("kpi", string()),
            ])),
        ),
    ])
}

fn person_profile_schema() -> Value {
    object(vec![
        ("name", string()),
        ("age", integer()),
        ("occupation", string()),
        ("background", string()),
        ("goals", strings()),
        ("pains", strings()),
        ("behaviors", strings()),
        ("quote", string()),
    ])
}
