//! Go-to-market plan and per-channel detail

use serde::{Deserialize, Serialize};

/// Execution status of a go-to-market channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
}

/// Go-to-market plan: exactly three fixed stages
///
/// The stages are struct fields rather than a list so the shape itself
/// guarantees there are always three of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GtmContent {
    pub validate: GtmStage,
    pub build_audience: GtmStage,
    pub scale: GtmStage,
}

impl GtmContent {
    /// Stage names in plan order
    pub const STAGE_NAMES: [&'static str; 3] = ["validate", "buildAudience", "scale"];

    pub fn stages(&self) -> [&GtmStage; 3] {
        [&self.validate, &self.build_audience, &self.scale]
    }

    pub fn stages_mut(&mut self) -> [&mut GtmStage; 3] {
        [&mut self.validate, &mut self.build_audience, &mut self.scale]
    }

    /// Find a channel by id in any stage
    pub fn channel(&self, channel_id: &str) -> Option<&GtmChannel> {
        self.stages()
            .into_iter()
            .flat_map(|stage| stage.channels.iter())
            .find(|c| c.id.as_deref() == Some(channel_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GtmStage {
    pub goal: String,
    pub channels: Vec<GtmChannel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GtmChannel {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub status: ChannelStatus,
    pub kpis: String,
}

/// Detailed execution plan for one channel and one customer segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GtmDetailedChannelContent {
    pub preparation_tasks: Vec<PreparationTask>,
    pub content_ideas: Vec<ContentIdea>,
    pub action_plan: Vec<ActionPlanEntry>,
    pub metrics_and_kpis: Vec<MetricKpi>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreparationTask {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContentIdea {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
}

/// One step of the action plan with its own task list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionPlanEntry {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub tasks: Vec<ActionTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionTask {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetricKpi {
    #[serde(default, alias = "_id", alias = "clientId", alias = "client_id")]
    pub id: Option<String>,
    pub metric: String,
    pub kpi: String,
}
