//! Persistence collaborator boundary
//!
//! The orchestration core never queries storage directly; it goes through
//! this trait. Implementations must keep at most one artifact per key.

use async_trait::async_trait;

use super::messages::StateResponse;
use crate::domain::{Artifact, ArtifactKey, ArtifactUpdate, Hypothesis, PersonProfile, Project};

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn find_project(&self, project_id: &str) -> StateResponse<Option<Project>>;

    /// Replace the project's provider identity token
    async fn set_project_identity(&self, project_id: &str, identity_id: &str) -> StateResponse<()>;

    async fn find_hypothesis(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Option<Hypothesis>>;

    /// Identity instructions cached for (project, user)
    async fn cached_instructions(&self, project_id: &str, user_id: &str) -> StateResponse<Option<String>>;

    async fn cache_instructions(&self, project_id: &str, user_id: &str, instructions: &str) -> StateResponse<()>;

    async fn find_artifact(&self, key: &ArtifactKey, user_id: &str) -> StateResponse<Option<Artifact>>;

    async fn get_artifact(&self, artifact_id: &str, user_id: &str) -> StateResponse<Option<Artifact>>;

    /// Insert a new artifact; `Conflict` if its key is already taken
    async fn create_artifact(&self, artifact: Artifact) -> StateResponse<Artifact>;

    /// Apply an update atomically; the stored artifact is untouched on error
    async fn update_artifact(&self, artifact_id: &str, user_id: &str, update: ArtifactUpdate)
    -> StateResponse<Artifact>;

    async fn delete_artifact(&self, key: &ArtifactKey, user_id: &str) -> StateResponse<()>;

    /// Delete whatever occupies the artifact's key, then insert it
    ///
    /// The default is two calls; stores that can do better should swap in
    /// one step.
    async fn replace_artifact(&self, artifact: Artifact) -> StateResponse<Artifact> {
        match self.delete_artifact(&artifact.key, &artifact.user_id).await {
            Ok(()) | Err(super::StateError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.create_artifact(artifact).await
    }

    /// Store a profile, replacing any profile of the same segment
    async fn save_person_profile(&self, profile: PersonProfile) -> StateResponse<()>;

    /// Delete the profiles of the given segments, returning how many went
    async fn delete_person_profiles(
        &self,
        hypothesis_id: &str,
        user_id: &str,
        segment_ids: &[String],
    ) -> StateResponse<usize>;

    async fn list_person_profiles(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Vec<PersonProfile>>;
}
