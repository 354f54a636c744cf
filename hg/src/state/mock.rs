//! Fault-injecting persistence wrapper for unit tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Persistence, StateError, StateManager, StateResponse};
use crate::domain::{Artifact, ArtifactKey, ArtifactUpdate, Hypothesis, PersonProfile, Project};

/// Delegates to an in-memory StateManager, failing selected operations on demand
pub struct FlakyStore {
    pub inner: StateManager,
    fail_cache_reads: AtomicBool,
    fail_cache_writes: AtomicBool,
    fail_creates: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: StateManager) -> Self {
        Self {
            inner,
            fail_cache_reads: AtomicBool::new(false),
            fail_cache_writes: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
        }
    }

    pub fn fail_cache_reads(&self) {
        self.fail_cache_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_cache_writes(&self) {
        self.fail_cache_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, what: &str) -> StateResponse<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StateError::StoreError(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for FlakyStore {
    async fn find_project(&self, project_id: &str) -> StateResponse<Option<Project>> {
        self.inner.find_project(project_id).await
    }

    async fn set_project_identity(&self, project_id: &str, identity_id: &str) -> StateResponse<()> {
        self.inner.set_project_identity(project_id, identity_id).await
    }

    async fn find_hypothesis(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Option<Hypothesis>> {
        self.inner.find_hypothesis(hypothesis_id, user_id).await
    }

    async fn cached_instructions(&self, project_id: &str, user_id: &str) -> StateResponse<Option<String>> {
        Self::injected(&self.fail_cache_reads, "cache read")?;
        self.inner.cached_instructions(project_id, user_id).await
    }

    async fn cache_instructions(&self, project_id: &str, user_id: &str, instructions: &str) -> StateResponse<()> {
        Self::injected(&self.fail_cache_writes, "cache write")?;
        self.inner.cache_instructions(project_id, user_id, instructions).await
    }

    async fn find_artifact(&self, key: &ArtifactKey, user_id: &str) -> StateResponse<Option<Artifact>> {
        self.inner.find_artifact(key, user_id).await
    }

    async fn get_artifact(&self, artifact_id: &str, user_id: &str) -> StateResponse<Option<Artifact>> {
        self.inner.get_artifact(artifact_id, user_id).await
    }

    async fn create_artifact(&self, artifact: Artifact) -> StateResponse<Artifact> {
        Self::injected(&self.fail_creates, "create")?;
        self.inner.create_artifact(artifact).await
    }

    async fn update_artifact(
        &self,
        artifact_id: &str,
        user_id: &str,
        update: ArtifactUpdate,
    ) -> StateResponse<Artifact> {
        self.inner.update_artifact(artifact_id, user_id, update).await
    }

    async fn delete_artifact(&self, key: &ArtifactKey, user_id: &str) -> StateResponse<()> {
        self.inner.delete_artifact(key, user_id).await
    }

    async fn save_person_profile(&self, profile: PersonProfile) -> StateResponse<()> {
        self.inner.save_person_profile(profile).await
    }

    async fn delete_person_profiles(
        &self,
        hypothesis_id: &str,
        user_id: &str,
        segment_ids: &[String],
    ) -> StateResponse<usize> {
        self.inner.delete_person_profiles(hypothesis_id, user_id, segment_ids).await
    }

    async fn list_person_profiles(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Vec<PersonProfile>> {
        self.inner.list_person_profiles(hypothesis_id, user_id).await
    }
}
