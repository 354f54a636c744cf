//! Projects, hypotheses and person profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::PersonProfileContent;
use super::id::mint_id;

/// A user's project; owns the provider identity all its artifacts use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub title: String,
    /// Provider identity token, `None` until one has been created
    #[serde(default)]
    pub identity_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: mint_id(),
            user_id: user_id.into(),
            title: title.into(),
            identity_id: None,
            created_at: Utc::now(),
        }
    }
}

/// User-authored hypothesis, parent of every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: mint_id(),
            project_id: project_id.into(),
            user_id: user_id.into(),
            title: title.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persona generated for one customer segment of a Core artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonProfile {
    pub id: String,
    pub hypothesis_id: String,
    pub user_id: String,
    pub segment_id: String,
    pub conversation_thread_id: String,
    pub content: PersonProfileContent,
    pub created_at: DateTime<Utc>,
}
