//! Typed artifact contents: lean canvas, research, validation, packaging
//!
//! Field names serialize in camelCase, matching the output schemas the
//! provider is constrained to. Every struct rejects unknown fields.

use serde::{Deserialize, Serialize};

/// Lean-canvas core of a hypothesis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoreContent {
    pub problems: Vec<String>,
    pub customer_segments: Vec<CustomerSegment>,
    pub unique_value_proposition: String,
    pub solutions: Vec<String>,
    pub channels: Vec<String>,
    pub revenue_streams: Vec<String>,
    pub cost_structure: Vec<String>,
    pub key_metrics: Vec<String>,
    pub unfair_advantage: String,
}

impl CoreContent {
    pub fn segment(&self, segment_id: &str) -> Option<&CustomerSegment> {
        self.customer_segments
            .iter()
            .find(|s| s.id.as_deref() == Some(segment_id))
    }
}

/// A customer segment; each one gets its own person profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomerSegment {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarketResearchContent {
    pub market_size: MarketSize,
    pub trends: Vec<MarketTrend>,
    pub competitors: Vec<Competitor>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
}

/// TAM / SAM / SOM estimates with their reasoning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarketSize {
    pub tam: String,
    pub sam: String,
    pub som: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarketTrend {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Competitor {
    pub name: String,
    pub description: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

/// Customer-validation plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValidationContent {
    pub assumptions: Vec<String>,
    pub interview_questions: Vec<String>,
    pub experiments: Vec<Experiment>,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Experiment {
    pub name: String,
    pub description: String,
    pub success_criteria: String,
}

/// Packaging and landing-page copy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PackingContent {
    pub headline: String,
    pub subheadline: String,
    pub benefits: Vec<Benefit>,
    pub call_to_action: String,
    pub social_proof: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Benefit {
    pub title: String,
    pub description: String,
}

/// Persona generated independently for one customer segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersonProfileContent {
    pub name: String,
    pub age: u32,
    pub occupation: String,
    pub background: String,
    pub goals: Vec<String>,
    pub pains: Vec<String>,
    pub behaviors: Vec<String>,
    pub quote: String,
}
