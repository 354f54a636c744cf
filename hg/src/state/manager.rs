//! StateManager - actor that owns the store
//!
//! Processes commands via channels for thread-safe access to persistent state.
//! Every mutation is snapshotted to the state file (when there is one) before
//! it is acknowledged; a failed snapshot rolls the mutation back.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{StateCommand, StateError, StateResponse};
use super::persistence::Persistence;
use crate::domain::{Artifact, ArtifactKey, ArtifactUpdate, Hypothesis, PersonProfile, Project};

/// Everything the store holds, as written to the state file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Snapshot {
    projects: BTreeMap<String, Project>,
    hypotheses: BTreeMap<String, Hypothesis>,
    artifacts: BTreeMap<String, Artifact>,
    profiles: BTreeMap<String, PersonProfile>,
    /// Cached identity instructions keyed by `project/user`
    instructions: BTreeMap<String, String>,
}

fn instructions_key(project_id: &str, user_id: &str) -> String {
    format!("{}/{}", project_id, user_id)
}

impl Snapshot {
    fn find_artifact(&self, key: &ArtifactKey, user_id: &str) -> Option<&Artifact> {
        self.artifacts
            .values()
            .find(|a| &a.key == key && a.user_id == user_id)
    }

    fn insert_artifact(&mut self, artifact: Artifact) -> StateResponse<Artifact> {
        if !artifact.key.is_well_formed() {
            return Err(StateError::Conflict(format!("malformed artifact key {}", artifact.key)));
        }
        if self.find_artifact(&artifact.key, &artifact.user_id).is_some() {
            return Err(StateError::Conflict(format!("artifact {} already exists", artifact.key)));
        }
        if self.artifacts.contains_key(&artifact.id) {
            return Err(StateError::Conflict(format!("artifact id {} already exists", artifact.id)));
        }
        self.artifacts.insert(artifact.id.clone(), artifact.clone());
        Ok(artifact)
    }

    fn remove_artifact(&mut self, key: &ArtifactKey, user_id: &str) -> StateResponse<()> {
        let id = self
            .find_artifact(key, user_id)
            .map(|a| a.id.clone())
            .ok_or_else(|| StateError::NotFound(format!("artifact {}", key)))?;
        self.artifacts.remove(&id);
        Ok(())
    }
}

/// In-memory store with an optional JSON snapshot file
struct Store {
    data: Snapshot,
    path: Option<PathBuf>,
}

impl Store {
    fn open(path: Option<PathBuf>) -> eyre::Result<Self> {
        debug!(?path, "Store::open: called");
        let data = match &path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path)?;
                let data: Snapshot = serde_json::from_str(&content)?;
                info!(
                    path = %path.display(),
                    artifacts = data.artifacts.len(),
                    "Loaded state snapshot"
                );
                data
            }
            _ => Snapshot::default(),
        };
        Ok(Self { data, path })
    }

    /// Write the snapshot to a temp file and rename it into place
    fn persist(&self) -> StateResponse<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        debug!(path = %path.display(), "Store::persist: called");

        let to_store_error = |e: std::io::Error| StateError::StoreError(format!("{}: {}", path.display(), e));
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(to_store_error)?;
        }
        let content = serde_json::to_string_pretty(&self.data).map_err(|e| StateError::StoreError(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(to_store_error)?;
        fs::rename(&tmp, path).map_err(to_store_error)?;
        Ok(())
    }

    /// Apply a mutation all-or-nothing
    fn mutate<T>(&mut self, op: impl FnOnce(&mut Snapshot) -> StateResponse<T>) -> StateResponse<T> {
        let backup = self.data.clone();
        let result = op(&mut self.data);
        match result {
            Ok(value) => match self.persist() {
                Ok(()) => Ok(value),
                Err(e) => {
                    warn!(error = %e, "Store::mutate: snapshot failed, rolling back");
                    self.data = backup;
                    Err(e)
                }
            },
            Err(e) => {
                self.data = backup;
                Err(e)
            }
        }
    }
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a StateManager actor backed by a snapshot file
    pub fn spawn(state_file: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(state_file = %state_file.as_ref().display(), "spawn: called");
        let store = Store::open(Some(state_file.as_ref().to_path_buf()))?;
        Ok(Self::start(store))
    }

    /// Spawn a StateManager actor that keeps everything in memory
    pub fn in_memory() -> Self {
        debug!("in_memory: called");
        Self::start(Store {
            data: Snapshot::default(),
            path: None,
        })
    }

    fn start(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");
        Self { tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Project and hypothesis operations ===

    /// Create a new project
    pub async fn create_project(&self, project: Project) -> StateResponse<String> {
        debug!(project_id = %project.id, "create_project: called");
        self.request(|reply| StateCommand::CreateProject { project, reply }).await
    }

    /// Create a hypothesis under an existing project
    pub async fn create_hypothesis(&self, hypothesis: Hypothesis) -> StateResponse<String> {
        debug!(hypothesis_id = %hypothesis.id, project_id = %hypothesis.project_id, "create_hypothesis: called");
        self.request(|reply| StateCommand::CreateHypothesis { hypothesis, reply })
            .await
    }

    /// All artifacts of a hypothesis
    pub async fn list_artifacts(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Vec<Artifact>> {
        debug!(%hypothesis_id, %user_id, "list_artifacts: called");
        self.request(|reply| StateCommand::ListArtifacts {
            hypothesis_id: hypothesis_id.to_string(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

#[async_trait]
impl Persistence for StateManager {
    async fn find_project(&self, project_id: &str) -> StateResponse<Option<Project>> {
        debug!(%project_id, "find_project: called");
        self.request(|reply| StateCommand::GetProject {
            id: project_id.to_string(),
            reply,
        })
        .await
    }

    async fn set_project_identity(&self, project_id: &str, identity_id: &str) -> StateResponse<()> {
        debug!(%project_id, %identity_id, "set_project_identity: called");
        self.request(|reply| StateCommand::SetProjectIdentity {
            project_id: project_id.to_string(),
            identity_id: identity_id.to_string(),
            reply,
        })
        .await
    }

    async fn find_hypothesis(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Option<Hypothesis>> {
        debug!(%hypothesis_id, %user_id, "find_hypothesis: called");
        self.request(|reply| StateCommand::GetHypothesis {
            id: hypothesis_id.to_string(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    async fn cached_instructions(&self, project_id: &str, user_id: &str) -> StateResponse<Option<String>> {
        debug!(%project_id, %user_id, "cached_instructions: called");
        self.request(|reply| StateCommand::GetInstructions {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    async fn cache_instructions(&self, project_id: &str, user_id: &str, instructions: &str) -> StateResponse<()> {
        debug!(%project_id, %user_id, "cache_instructions: called");
        self.request(|reply| StateCommand::CacheInstructions {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            instructions: instructions.to_string(),
            reply,
        })
        .await
    }

    async fn find_artifact(&self, key: &ArtifactKey, user_id: &str) -> StateResponse<Option<Artifact>> {
        debug!(%key, %user_id, "find_artifact: called");
        self.request(|reply| StateCommand::FindArtifact {
            key: key.clone(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    async fn get_artifact(&self, artifact_id: &str, user_id: &str) -> StateResponse<Option<Artifact>> {
        debug!(%artifact_id, %user_id, "get_artifact: called");
        self.request(|reply| StateCommand::GetArtifact {
            id: artifact_id.to_string(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    async fn create_artifact(&self, artifact: Artifact) -> StateResponse<Artifact> {
        debug!(artifact_id = %artifact.id, key = %artifact.key, "create_artifact: called");
        self.request(|reply| StateCommand::CreateArtifact { artifact, reply })
            .await
    }

    async fn update_artifact(
        &self,
        artifact_id: &str,
        user_id: &str,
        update: ArtifactUpdate,
    ) -> StateResponse<Artifact> {
        debug!(%artifact_id, %user_id, has_content = update.content.is_some(), "update_artifact: called");
        self.request(|reply| StateCommand::UpdateArtifact {
            id: artifact_id.to_string(),
            user_id: user_id.to_string(),
            update,
            reply,
        })
        .await
    }

    async fn delete_artifact(&self, key: &ArtifactKey, user_id: &str) -> StateResponse<()> {
        debug!(%key, %user_id, "delete_artifact: called");
        self.request(|reply| StateCommand::DeleteArtifact {
            key: key.clone(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    async fn replace_artifact(&self, artifact: Artifact) -> StateResponse<Artifact> {
        debug!(artifact_id = %artifact.id, key = %artifact.key, "replace_artifact: called");
        self.request(|reply| StateCommand::ReplaceArtifact { artifact, reply })
            .await
    }

    async fn save_person_profile(&self, profile: PersonProfile) -> StateResponse<()> {
        debug!(profile_id = %profile.id, segment_id = %profile.segment_id, "save_person_profile: called");
        self.request(|reply| StateCommand::SaveProfile { profile, reply }).await
    }

    async fn delete_person_profiles(
        &self,
        hypothesis_id: &str,
        user_id: &str,
        segment_ids: &[String],
    ) -> StateResponse<usize> {
        debug!(%hypothesis_id, %user_id, count = segment_ids.len(), "delete_person_profiles: called");
        self.request(|reply| StateCommand::DeleteProfiles {
            hypothesis_id: hypothesis_id.to_string(),
            user_id: user_id.to_string(),
            segment_ids: segment_ids.to_vec(),
            reply,
        })
        .await
    }

    async fn list_person_profiles(&self, hypothesis_id: &str, user_id: &str) -> StateResponse<Vec<PersonProfile>> {
        debug!(%hypothesis_id, %user_id, "list_person_profiles: called");
        self.request(|reply| StateCommand::ListProfiles {
            hypothesis_id: hypothesis_id.to_string(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }
}

/// The actor loop that processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: called");
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            // Project operations
            StateCommand::CreateProject { project, reply } => {
                debug!(project_id = %project.id, "actor_loop: CreateProject command");
                let result = store.mutate(|data| {
                    if data.projects.contains_key(&project.id) {
                        return Err(StateError::Conflict(format!("project {} already exists", project.id)));
                    }
                    let id = project.id.clone();
                    data.projects.insert(id.clone(), project);
                    Ok(id)
                });
                let _ = reply.send(result);
            }

            StateCommand::GetProject { id, reply } => {
                debug!(%id, "actor_loop: GetProject command");
                let _ = reply.send(Ok(store.data.projects.get(&id).cloned()));
            }

            StateCommand::SetProjectIdentity {
                project_id,
                identity_id,
                reply,
            } => {
                debug!(%project_id, %identity_id, "actor_loop: SetProjectIdentity command");
                let result = store.mutate(|data| {
                    let project = data
                        .projects
                        .get_mut(&project_id)
                        .ok_or_else(|| StateError::NotFound(format!("project {}", project_id)))?;
                    project.identity_id = Some(identity_id);
                    Ok(())
                });
                let _ = reply.send(result);
            }

            // Hypothesis operations
            StateCommand::CreateHypothesis { hypothesis, reply } => {
                debug!(hypothesis_id = %hypothesis.id, "actor_loop: CreateHypothesis command");
                let result = store.mutate(|data| {
                    match data.projects.get(&hypothesis.project_id) {
                        Some(project) if project.user_id == hypothesis.user_id => {}
                        _ => {
                            return Err(StateError::NotFound(format!("project {}", hypothesis.project_id)));
                        }
                    }
                    if data.hypotheses.contains_key(&hypothesis.id) {
                        return Err(StateError::Conflict(format!("hypothesis {} already exists", hypothesis.id)));
                    }
                    let id = hypothesis.id.clone();
                    data.hypotheses.insert(id.clone(), hypothesis);
                    Ok(id)
                });
                let _ = reply.send(result);
            }

            StateCommand::GetHypothesis { id, user_id, reply } => {
                debug!(%id, %user_id, "actor_loop: GetHypothesis command");
                let found = store
                    .data
                    .hypotheses
                    .get(&id)
                    .filter(|h| h.user_id == user_id)
                    .cloned();
                let _ = reply.send(Ok(found));
            }

            // Instructions cache
            StateCommand::GetInstructions {
                project_id,
                user_id,
                reply,
            } => {
                debug!(%project_id, %user_id, "actor_loop: GetInstructions command");
                let cached = store
                    .data
                    .instructions
                    .get(&instructions_key(&project_id, &user_id))
                    .cloned();
                let _ = reply.send(Ok(cached));
            }

            StateCommand::CacheInstructions {
                project_id,
                user_id,
                instructions,
                reply,
            } => {
                debug!(%project_id, %user_id, "actor_loop: CacheInstructions command");
                let result = store.mutate(|data| {
                    data.instructions
                        .insert(instructions_key(&project_id, &user_id), instructions);
                    Ok(())
                });
                let _ = reply.send(result);
            }

            // Artifact operations
            StateCommand::FindArtifact { key, user_id, reply } => {
                debug!(%key, %user_id, "actor_loop: FindArtifact command");
                let _ = reply.send(Ok(store.data.find_artifact(&key, &user_id).cloned()));
            }

            StateCommand::GetArtifact { id, user_id, reply } => {
                debug!(%id, %user_id, "actor_loop: GetArtifact command");
                let found = store
                    .data
                    .artifacts
                    .get(&id)
                    .filter(|a| a.user_id == user_id)
                    .cloned();
                let _ = reply.send(Ok(found));
            }

            StateCommand::CreateArtifact { artifact, reply } => {
                debug!(artifact_id = %artifact.id, "actor_loop: CreateArtifact command");
                let result = store.mutate(|data| data.insert_artifact(artifact));
                let _ = reply.send(result);
            }

            StateCommand::UpdateArtifact {
                id,
                user_id,
                update,
                reply,
            } => {
                debug!(%id, %user_id, "actor_loop: UpdateArtifact command");
                let result = store.mutate(|data| {
                    let artifact = data
                        .artifacts
                        .get_mut(&id)
                        .filter(|a| a.user_id == user_id)
                        .ok_or_else(|| StateError::NotFound(format!("artifact {}", id)))?;
                    if let Some(content) = update.content {
                        if content.kind() != artifact.kind() {
                            return Err(StateError::Conflict(format!(
                                "cannot store {} content in {} artifact {}",
                                content.kind(),
                                artifact.kind(),
                                id
                            )));
                        }
                        artifact.content = content;
                    }
                    if let Some(thread_id) = update.thread_id {
                        artifact.conversation_thread_id = thread_id;
                    }
                    artifact.updated_at = Utc::now();
                    Ok(artifact.clone())
                });
                let _ = reply.send(result);
            }

            StateCommand::ReplaceArtifact { artifact, reply } => {
                debug!(artifact_id = %artifact.id, key = %artifact.key, "actor_loop: ReplaceArtifact command");
                let result = store.mutate(|data| {
                    match data.remove_artifact(&artifact.key, &artifact.user_id) {
                        Ok(()) | Err(StateError::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                    data.insert_artifact(artifact)
                });
                let _ = reply.send(result);
            }

            StateCommand::DeleteArtifact { key, user_id, reply } => {
                debug!(%key, %user_id, "actor_loop: DeleteArtifact command");
                let result = store.mutate(|data| data.remove_artifact(&key, &user_id));
                let _ = reply.send(result);
            }

            StateCommand::ListArtifacts {
                hypothesis_id,
                user_id,
                reply,
            } => {
                debug!(%hypothesis_id, %user_id, "actor_loop: ListArtifacts command");
                let artifacts = store
                    .data
                    .artifacts
                    .values()
                    .filter(|a| a.key.hypothesis_id == hypothesis_id && a.user_id == user_id)
                    .cloned()
                    .collect();
                let _ = reply.send(Ok(artifacts));
            }

            // Person profile operations
            StateCommand::SaveProfile { profile, reply } => {
                debug!(profile_id = %profile.id, "actor_loop: SaveProfile command");
                let result = store.mutate(|data| {
                    data.profiles.retain(|_, p| {
                        !(p.hypothesis_id == profile.hypothesis_id
                            && p.user_id == profile.user_id
                            && p.segment_id == profile.segment_id)
                    });
                    data.profiles.insert(profile.id.clone(), profile);
                    Ok(())
                });
                let _ = reply.send(result);
            }

            StateCommand::DeleteProfiles {
                hypothesis_id,
                user_id,
                segment_ids,
                reply,
            } => {
                debug!(%hypothesis_id, %user_id, "actor_loop: DeleteProfiles command");
                let result = store.mutate(|data| {
                    let before = data.profiles.len();
                    data.profiles.retain(|_, p| {
                        !(p.hypothesis_id == hypothesis_id
                            && p.user_id == user_id
                            && segment_ids.contains(&p.segment_id))
                    });
                    Ok(before - data.profiles.len())
                });
                let _ = reply.send(result);
            }

            StateCommand::ListProfiles {
                hypothesis_id,
                user_id,
                reply,
            } => {
                debug!(%hypothesis_id, %user_id, "actor_loop: ListProfiles command");
                let profiles = store
                    .data
                    .profiles
                    .values()
                    .filter(|p| p.hypothesis_id == hypothesis_id && p.user_id == user_id)
                    .cloned()
                    .collect();
                let _ = reply.send(Ok(profiles));
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
