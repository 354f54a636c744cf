//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Artifact, ArtifactKey, ArtifactUpdate, Hypothesis, PersonProfile, Project};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Project operations
    CreateProject {
        project: Project,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetProject {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Project>>>,
    },
    SetProjectIdentity {
        project_id: String,
        identity_id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Hypothesis operations
    CreateHypothesis {
        hypothesis: Hypothesis,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetHypothesis {
        id: String,
        user_id: String,
        reply: oneshot::Sender<StateResponse<Option<Hypothesis>>>,
    },

    // Identity instructions cache
    GetInstructions {
        project_id: String,
        user_id: String,
        reply: oneshot::Sender<StateResponse<Option<String>>>,
    },
    CacheInstructions {
        project_id: String,
        user_id: String,
        instructions: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Artifact operations
    FindArtifact {
        key: ArtifactKey,
        user_id: String,
        reply: oneshot::Sender<StateResponse<Option<Artifact>>>,
    },
    GetArtifact {
        id: String,
        user_id: String,
        reply: oneshot::Sender<StateResponse<Option<Artifact>>>,
    },
    CreateArtifact {
        artifact: Artifact,
        reply: oneshot::Sender<StateResponse<Artifact>>,
    },
    UpdateArtifact {
        id: String,
        user_id: String,
        update: ArtifactUpdate,
        reply: oneshot::Sender<StateResponse<Artifact>>,
    },
    ReplaceArtifact {
        artifact: Artifact,
        reply: oneshot::Sender<StateResponse<Artifact>>,
    },
    DeleteArtifact {
        key: ArtifactKey,
        user_id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListArtifacts {
        hypothesis_id: String,
        user_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Artifact>>>,
    },

    // Person profile operations
    SaveProfile {
        profile: PersonProfile,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    DeleteProfiles {
        hypothesis_id: String,
        user_id: String,
        segment_ids: Vec<String>,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    ListProfiles {
        hypothesis_id: String,
        user_id: String,
        reply: oneshot::Sender<StateResponse<Vec<PersonProfile>>>,
    },

    // Shutdown
    Shutdown,
}
