//! Artifact records
//!
//! An artifact is one generated planning document tied to a hypothesis and
//! bound to the provider conversation it was generated on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

use super::content::{CoreContent, MarketResearchContent, PackingContent, ValidationContent};
use super::gtm::{GtmContent, GtmDetailedChannelContent};
use super::id::{fold_client_ids, mint_id};

/// The six kinds of generated artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Core,
    MarketResearch,
    Validation,
    Packing,
    Gtm,
    GtmDetailedChannel,
}

impl ArtifactKind {
    /// Kinds generated once per hypothesis (everything but detailed channels)
    pub const PER_HYPOTHESIS: [ArtifactKind; 5] = [
        ArtifactKind::Core,
        ArtifactKind::MarketResearch,
        ArtifactKind::Validation,
        ArtifactKind::Packing,
        ArtifactKind::Gtm,
    ];

    /// Stable kebab-case label used in config keys, CLI flags and lock keys
    pub fn label(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::MarketResearch => "market-research",
            Self::Validation => "validation",
            Self::Packing => "packing",
            Self::Gtm => "gtm",
            Self::GtmDetailedChannel => "gtm-detailed-channel",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "ArtifactKind::from_str: called");
        match s.to_lowercase().replace('_', "-").as_str() {
            "core" => Ok(Self::Core),
            "market-research" => Ok(Self::MarketResearch),
            "validation" => Ok(Self::Validation),
            "packing" => Ok(Self::Packing),
            "gtm" => Ok(Self::Gtm),
            "gtm-detailed-channel" => Ok(Self::GtmDetailedChannel),
            other => Err(format!("unknown artifact kind '{}'", other)),
        }
    }
}

/// The (customer segment, channel) pair a detailed-channel artifact belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelScope {
    pub segment_id: String,
    pub channel_id: String,
}

/// Identifies the single artifact slot of one kind within a hypothesis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactKey {
    pub hypothesis_id: String,
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelScope>,
}

impl ArtifactKey {
    /// Key for a per-hypothesis artifact kind
    pub fn new(hypothesis_id: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            hypothesis_id: hypothesis_id.into(),
            kind,
            channel: None,
        }
    }

    /// Key for the detailed plan of one channel for one customer segment
    pub fn detailed_channel(
        hypothesis_id: impl Into<String>,
        segment_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            hypothesis_id: hypothesis_id.into(),
            kind: ArtifactKind::GtmDetailedChannel,
            channel: Some(ChannelScope {
                segment_id: segment_id.into(),
                channel_id: channel_id.into(),
            }),
        }
    }

    /// Detailed-channel keys carry a scope, every other kind must not
    pub fn is_well_formed(&self) -> bool {
        (self.kind == ArtifactKind::GtmDetailedChannel) == self.channel.is_some()
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.channel {
            Some(scope) => write!(
                f,
                "{}/{}/{}/{}",
                self.hypothesis_id, self.kind, scope.segment_id, scope.channel_id
            ),
            None => write!(f, "{}/{}", self.hypothesis_id, self.kind),
        }
    }
}

/// Typed content of an artifact, one variant per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum ArtifactContent {
    Core(CoreContent),
    MarketResearch(MarketResearchContent),
    Validation(ValidationContent),
    Packing(PackingContent),
    Gtm(GtmContent),
    GtmDetailedChannel(GtmDetailedChannelContent),
}

impl ArtifactContent {
    /// The kind this content belongs to
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Core(_) => ArtifactKind::Core,
            Self::MarketResearch(_) => ArtifactKind::MarketResearch,
            Self::Validation(_) => ArtifactKind::Validation,
            Self::Packing(_) => ArtifactKind::Packing,
            Self::Gtm(_) => ArtifactKind::Gtm,
            Self::GtmDetailedChannel(_) => ArtifactKind::GtmDetailedChannel,
        }
    }

    /// Parse a JSON object into the typed content for `kind`
    ///
    /// The typed structs reject unknown fields, so only allow-listed fields
    /// ever reach storage. Client id fields are folded into `id` first.
    pub fn from_value(kind: ArtifactKind, mut value: Value) -> Result<Self, serde_json::Error> {
        debug!(%kind, "ArtifactContent::from_value: called");
        fold_client_ids(&mut value).map_err(<serde_json::Error as serde::de::Error>::custom)?;
        Ok(match kind {
            ArtifactKind::Core => Self::Core(serde_json::from_value(value)?),
            ArtifactKind::MarketResearch => Self::MarketResearch(serde_json::from_value(value)?),
            ArtifactKind::Validation => Self::Validation(serde_json::from_value(value)?),
            ArtifactKind::Packing => Self::Packing(serde_json::from_value(value)?),
            ArtifactKind::Gtm => Self::Gtm(serde_json::from_value(value)?),
            ArtifactKind::GtmDetailedChannel => Self::GtmDetailedChannel(serde_json::from_value(value)?),
        })
    }

    /// Serialize the inner content object (without the kind tag)
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Core(c) => serde_json::to_value(c),
            Self::MarketResearch(c) => serde_json::to_value(c),
            Self::Validation(c) => serde_json::to_value(c),
            Self::Packing(c) => serde_json::to_value(c),
            Self::Gtm(c) => serde_json::to_value(c),
            Self::GtmDetailedChannel(c) => serde_json::to_value(c),
        }
    }

    pub fn as_core(&self) -> Option<&CoreContent> {
        match self {
            Self::Core(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_gtm(&self) -> Option<&GtmContent> {
        match self {
            Self::Gtm(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_detailed_channel(&self) -> Option<&GtmDetailedChannelContent> {
        match self {
            Self::GtmDetailedChannel(c) => Some(c),
            _ => None,
        }
    }
}

/// A persisted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub key: ArtifactKey,
    pub user_id: String,
    /// Provider conversation this artifact is bound to for its lifetime
    pub conversation_thread_id: String,
    pub content: ArtifactContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Build a new, not yet persisted artifact
    pub fn new(key: ArtifactKey, user_id: impl Into<String>, thread_id: impl Into<String>, content: ArtifactContent) -> Self {
        let now = Utc::now();
        Self {
            id: mint_id(),
            key,
            user_id: user_id.into(),
            conversation_thread_id: thread_id.into(),
            content,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.key.kind
    }
}

/// Changes applied atomically by the persistence collaborator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactUpdate {
    pub content: Option<ArtifactContent>,
    pub thread_id: Option<String>,
}

impl ArtifactUpdate {
    pub fn content(content: ArtifactContent) -> Self {
        Self {
            content: Some(content),
            thread_id: None,
        }
    }

    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            content: None,
            thread_id: Some(thread_id.into()),
        }
    }
}
