//! Domain types for hypogen
//!
//! Projects and hypotheses are user-authored; artifacts and person profiles
//! are generated. Nested collection items carry stable ids that survive edits.

mod artifact;
mod content;
mod gtm;
pub mod id;
mod project;

pub use artifact::{Artifact, ArtifactContent, ArtifactKey, ArtifactKind, ArtifactUpdate, ChannelScope};
pub use content::{
    Benefit, Competitor, CoreContent, CustomerSegment, Experiment, MarketResearchContent, MarketSize, MarketTrend,
    PackingContent, PersonProfileContent, ValidationContent,
};
pub use gtm::{
    ActionPlanEntry, ActionTask, ChannelStatus, ContentIdea, GtmChannel, GtmContent, GtmDetailedChannelContent,
    GtmStage, MetricKpi, PreparationTask,
};
pub use project::{Hypothesis, PersonProfile, Project};
