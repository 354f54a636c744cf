//! Orchestration entry points
//!
//! Ties identity, conversations, generation, merge and persistence together
//! for each artifact operation. Every mutating operation holds the keyed
//! lock of the artifact it touches.

mod profiles;

pub use profiles::{PersonProfileJob, ProfileJobSink, ProfileQueue, run_pending, spawn_profile_worker};

#[cfg(test)]
pub use profiles::mock;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::HypothesisError;
use crate::config::{Config, GenerationConfig};
use crate::conversation::ConversationManager;
use crate::domain::id::mint_id;
use crate::domain::{
    Artifact, ArtifactContent, ArtifactKey, ArtifactKind, ArtifactUpdate, ContentIdea, CoreContent, Hypothesis,
    PersonProfile, PersonProfileContent, Project,
};
use crate::identity::IdentityMigrator;
use crate::locks::KeyedLocks;
use crate::merge::overlay;
use crate::pipeline::{Generated, GenerationPipeline, GenerationRequest, PollPolicy, Sleeper, ThreadBinding};
use crate::prompts::{ArtifactPrompt, ChangePrompt, ContentIdeaPrompt, PriorArtifact, ProfilePrompt, PromptBuilder, Subject};
use crate::provider::AssistantProvider;
use crate::schema::{OutputSchema, parse_artifact};
use crate::state::Persistence;

/// How an existing artifact is changed
#[derive(Debug, Clone, PartialEq)]
pub enum AmendRequest {
    /// Partial JSON document overlaid onto the current content
    Edit(Value),
    /// Natural-language change carried out by the model on the artifact's thread
    Instruct(String),
}

/// Hypothesis and the project it belongs to, both owned by the caller
struct Scope {
    hypothesis: Hypothesis,
    project: Project,
}

/// Collaborators the orchestrator is built from
pub struct Services {
    pub provider: Arc<dyn AssistantProvider>,
    pub store: Arc<dyn Persistence>,
    pub prompts: Arc<dyn PromptBuilder>,
    pub profiles: Arc<dyn ProfileJobSink>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// Artifact generation, regeneration and amendment
pub struct Orchestrator {
    store: Arc<dyn Persistence>,
    prompts: Arc<dyn PromptBuilder>,
    profiles: Arc<dyn ProfileJobSink>,
    pipeline: GenerationPipeline,
    conversations: ConversationManager,
    identities: IdentityMigrator,
    generation: GenerationConfig,
    locks: KeyedLocks,
}

impl Orchestrator {
    pub fn new(services: Services, config: &Config) -> Self {
        let Services {
            provider,
            store,
            prompts,
            profiles,
            sleeper,
        } = services;
        let policy = PollPolicy::from_config(&config.polling);
        Self {
            pipeline: GenerationPipeline::new(provider.clone(), policy, sleeper),
            conversations: ConversationManager::new(provider.clone(), store.clone()),
            identities: IdentityMigrator::new(provider, store.clone(), prompts.clone(), config.identity.clone()),
            store,
            prompts,
            profiles,
            generation: config.generation.clone(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn identities(&self) -> &IdentityMigrator {
        &self.identities
    }

    /// Generate an artifact, or return the one already stored under its key
    pub async fn generate_artifact(
        &self,
        key: &ArtifactKey,
        user_id: &str,
        extra: Option<&str>,
    ) -> Result<Artifact, HypothesisError> {
        debug!(%key, %user_id, ?extra, "generate_artifact: called");
        check_key(key)?;
        let _guard = self.locks.acquire(&key.to_string()).await;
        let scope = self.scope(&key.hypothesis_id, user_id).await?;

        if let Some(existing) = self.store.find_artifact(key, user_id).await? {
            info!(%key, artifact_id = %existing.id, "Artifact already exists");
            return Ok(existing);
        }

        let generated = self.generate_content(&scope, key, extra).await?;
        let artifact = Artifact::new(key.clone(), user_id, generated.thread_id, generated.content);
        let artifact = self.store.create_artifact(artifact).await?;
        info!(%key, artifact_id = %artifact.id, thread_id = %artifact.conversation_thread_id, "Artifact generated");

        self.sync_profiles(&artifact, None).await;
        Ok(artifact)
    }

    /// Replace an artifact with a freshly generated one on a new thread
    ///
    /// The replacement is generated before anything is deleted, so a failed
    /// run leaves the old artifact in place.
    pub async fn regenerate_artifact(
        &self,
        key: &ArtifactKey,
        user_id: &str,
        extra: Option<&str>,
    ) -> Result<Artifact, HypothesisError> {
        debug!(%key, %user_id, ?extra, "regenerate_artifact: called");
        check_key(key)?;
        let _guard = self.locks.acquire(&key.to_string()).await;
        let scope = self.scope(&key.hypothesis_id, user_id).await?;
        let previous = self.store.find_artifact(key, user_id).await?;

        let generated = self.generate_content(&scope, key, extra).await?;
        let artifact = Artifact::new(key.clone(), user_id, generated.thread_id, generated.content);
        let artifact = self.store.replace_artifact(artifact).await?;
        info!(
            %key,
            artifact_id = %artifact.id,
            old_thread = ?previous.as_ref().map(|a| &a.conversation_thread_id),
            new_thread = %artifact.conversation_thread_id,
            "Artifact regenerated"
        );

        self.sync_profiles(&artifact, previous.as_ref().map(|a| &a.content)).await;
        Ok(artifact)
    }

    /// Change an artifact by manual edit or by instruction
    ///
    /// Ids are reconciled against the stored content. On any error the stored
    /// content is left as it was.
    pub async fn amend_artifact(
        &self,
        artifact_id: &str,
        user_id: &str,
        request: AmendRequest,
    ) -> Result<Artifact, HypothesisError> {
        debug!(%artifact_id, %user_id, "amend_artifact: called");
        let artifact = self.load_artifact(artifact_id, user_id).await?;
        let _guard = self.locks.acquire(&artifact.key.to_string()).await;
        // reload under the lock; a concurrent operation may have replaced it
        let artifact = self.load_artifact(artifact_id, user_id).await?;
        let kind = artifact.kind();

        let mut content = match request {
            AmendRequest::Edit(patch) => apply_edit(&artifact.content, patch)?,
            AmendRequest::Instruct(instruction) => {
                let scope = self.scope(&artifact.key.hypothesis_id, user_id).await?;
                let current = pretty(&artifact.content)?;
                let text = self
                    .prompts
                    .change(&ChangePrompt {
                        kind: kind.label().to_string(),
                        current,
                        instruction,
                    })
                    .map_err(|e| HypothesisError::Prompt(e.to_string()))?;

                let schema = OutputSchema::Artifact(kind);
                let max_tokens = self.generation.max_tokens_for(kind);
                let (generated, _thread) = self
                    .conversations
                    .with_thread(&artifact, |thread| {
                        let scope = &scope;
                        let text = text.as_str();
                        async move {
                            self.run_turn(&scope.project, schema, text, max_tokens, None, ThreadBinding::Existing(&thread))
                                .await
                        }
                    })
                    .await?;
                parse_artifact(kind, generated.content)?
            }
        };
        content.reconcile(Some(&artifact.content));

        let updated = self
            .store
            .update_artifact(&artifact.id, user_id, ArtifactUpdate::content(content))
            .await?;
        info!(artifact_id = %updated.id, %kind, "Artifact amended");

        self.sync_profiles(&updated, Some(&artifact.content)).await;
        Ok(updated)
    }

    /// Append generated content ideas to a detailed channel, one turn each
    ///
    /// Ideas whose title repeats an existing one are skipped. Nothing is
    /// stored unless every turn succeeds.
    pub async fn add_content_ideas(
        &self,
        artifact_id: &str,
        user_id: &str,
        count: usize,
        hint: Option<&str>,
    ) -> Result<Artifact, HypothesisError> {
        debug!(%artifact_id, %user_id, %count, ?hint, "add_content_ideas: called");
        let artifact = self.load_artifact(artifact_id, user_id).await?;
        let _guard = self.locks.acquire(&artifact.key.to_string()).await;
        let mut artifact = self.load_artifact(artifact_id, user_id).await?;

        let Some(detailed) = artifact.content.as_detailed_channel() else {
            return Err(HypothesisError::InvalidEdit(format!(
                "content ideas belong to a gtm-detailed-channel artifact, {} is {}",
                artifact.id,
                artifact.kind()
            )));
        };
        let mut ideas = detailed.content_ideas.clone();
        let scope = self.scope(&artifact.key.hypothesis_id, user_id).await?;
        let (segment, channel) = self.channel_subjects(&artifact.key, user_id).await?;

        let mut added = 0;
        for _ in 0..count {
            let text = self
                .prompts
                .content_idea(&ContentIdeaPrompt {
                    channel_name: channel.name.clone(),
                    segment_name: segment.name.clone(),
                    existing_titles: ideas.iter().map(|i| i.title.clone()).collect(),
                    hint: hint.map(str::to_string),
                })
                .map_err(|e| HypothesisError::Prompt(e.to_string()))?;

            let max_tokens = self.generation.max_tokens;
            let (generated, thread) = self
                .conversations
                .with_thread(&artifact, |thread| {
                    let scope = &scope;
                    let text = text.as_str();
                    async move {
                        self.run_turn(
                            &scope.project,
                            OutputSchema::ContentIdea,
                            text,
                            max_tokens,
                            None,
                            ThreadBinding::Existing(&thread),
                        )
                        .await
                    }
                })
                .await?;
            artifact.conversation_thread_id = thread;

            let mut idea: ContentIdea = OutputSchema::ContentIdea.parse(generated.content)?;
            let title = idea.title.trim().to_lowercase();
            if ideas.iter().any(|existing| existing.title.trim().to_lowercase() == title) {
                warn!(artifact_id = %artifact.id, title = %idea.title, "Skipping duplicate content idea");
                continue;
            }
            idea.id = Some(mint_id());
            ideas.push(idea);
            added += 1;
        }

        let mut content = artifact.content.clone();
        if let ArtifactContent::GtmDetailedChannel(detailed) = &mut content {
            detailed.content_ideas = ideas;
        }
        let updated = self
            .store
            .update_artifact(&artifact.id, user_id, ArtifactUpdate::content(content))
            .await?;
        info!(artifact_id = %updated.id, %added, requested = %count, "Content ideas added");
        Ok(updated)
    }

    /// Generate and store the profile of one customer segment
    ///
    /// Returns `None` when the segment no longer exists in the Core artifact.
    pub async fn generate_person_profile(&self, job: &PersonProfileJob) -> Result<Option<PersonProfile>, HypothesisError> {
        debug!(hypothesis_id = %job.hypothesis_id, segment_id = %job.segment_id, "generate_person_profile: called");
        let scope = self.scope(&job.hypothesis_id, &job.user_id).await?;

        let text = self
            .prompts
            .person_profile(&ProfilePrompt {
                hypothesis_title: scope.hypothesis.title.clone(),
                hypothesis_description: scope.hypothesis.description.clone(),
                segment_name: job.segment_name.clone(),
                segment_description: job.segment_description.clone(),
            })
            .map_err(|e| HypothesisError::Prompt(e.to_string()))?;
        let generated = self
            .run_turn(
                &scope.project,
                OutputSchema::PersonProfile,
                &text,
                self.generation.max_tokens,
                None,
                ThreadBinding::Fresh,
            )
            .await?;
        let content: PersonProfileContent = OutputSchema::PersonProfile.parse(generated.content)?;

        let core_key = ArtifactKey::new(&job.hypothesis_id, ArtifactKind::Core);
        let still_present = self
            .store
            .find_artifact(&core_key, &job.user_id)
            .await?
            .and_then(|a| a.content.as_core().map(|c| c.segment(&job.segment_id).is_some()))
            .unwrap_or(false);
        if !still_present {
            return Ok(None);
        }

        let profile = PersonProfile {
            id: mint_id(),
            hypothesis_id: job.hypothesis_id.clone(),
            user_id: job.user_id.clone(),
            segment_id: job.segment_id.clone(),
            conversation_thread_id: generated.thread_id,
            content,
            created_at: chrono::Utc::now(),
        };
        self.store.save_person_profile(profile.clone()).await?;
        Ok(Some(profile))
    }

    /// Generate all per-hypothesis artifacts concurrently
    ///
    /// Each kind succeeds or fails on its own.
    pub async fn generate_hypothesis(
        &self,
        hypothesis_id: &str,
        user_id: &str,
    ) -> Vec<(ArtifactKind, Result<Artifact, HypothesisError>)> {
        debug!(%hypothesis_id, %user_id, "generate_hypothesis: called");
        let keys: Vec<ArtifactKey> = ArtifactKind::PER_HYPOTHESIS
            .iter()
            .map(|kind| ArtifactKey::new(hypothesis_id, *kind))
            .collect();
        let results = join_all(keys.iter().map(|key| self.generate_artifact(key, user_id, None))).await;

        let results: Vec<_> = keys.iter().map(|k| k.kind).zip(results).collect();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(%hypothesis_id, generated = results.len() - failed, %failed, "Hypothesis generation finished");
        results
    }

    // === internals ===

    async fn scope(&self, hypothesis_id: &str, user_id: &str) -> Result<Scope, HypothesisError> {
        let hypothesis = self
            .store
            .find_hypothesis(hypothesis_id, user_id)
            .await?
            .ok_or_else(|| HypothesisError::NotFound(format!("hypothesis {}", hypothesis_id)))?;
        let project = self
            .store
            .find_project(&hypothesis.project_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| HypothesisError::NotFound(format!("project {}", hypothesis.project_id)))?;
        Ok(Scope { hypothesis, project })
    }

    async fn load_artifact(&self, artifact_id: &str, user_id: &str) -> Result<Artifact, HypothesisError> {
        self.store
            .get_artifact(artifact_id, user_id)
            .await?
            .ok_or_else(|| HypothesisError::NotFound(format!("artifact {}", artifact_id)))
    }

    /// One turn with the project's identity, repairing it once if the provider rejects it
    async fn run_turn(
        &self,
        project: &Project,
        schema: OutputSchema,
        instruction: &str,
        max_tokens: u32,
        extra: Option<&str>,
        binding: ThreadBinding<'_>,
    ) -> Result<Generated<Value>, HypothesisError> {
        let mut identity = self.identities.ensure_identity(project).await?;
        let mut repaired = false;
        loop {
            let request = GenerationRequest {
                schema,
                instruction,
                identity_id: &identity,
                max_tokens,
                extra,
            };
            match self.pipeline.generate(&request, binding).await {
                Err(HypothesisError::IdentityNotFound(rejected)) if !repaired => {
                    warn!(project_id = %project.id, %rejected, "Provider rejected the identity, repairing");
                    let current = Project {
                        identity_id: Some(rejected),
                        ..project.clone()
                    };
                    identity = self.identities.repair_identity(&current).await?;
                    repaired = true;
                }
                other => return other,
            }
        }
    }

    /// Fresh content for a key on a new thread, ids minted
    async fn generate_content(
        &self,
        scope: &Scope,
        key: &ArtifactKey,
        extra: Option<&str>,
    ) -> Result<Generated<ArtifactContent>, HypothesisError> {
        let context = self.artifact_context(scope, key).await?;
        let text = self
            .prompts
            .artifact(&context)
            .map_err(|e| HypothesisError::Prompt(e.to_string()))?;

        let generated = self
            .run_turn(
                &scope.project,
                OutputSchema::Artifact(key.kind),
                &text,
                self.generation.max_tokens_for(key.kind),
                extra,
                ThreadBinding::Fresh,
            )
            .await?;
        let mut content = parse_artifact(key.kind, generated.content)?;
        content.reconcile(None);
        Ok(Generated {
            content,
            thread_id: generated.thread_id,
        })
    }

    async fn artifact_context(&self, scope: &Scope, key: &ArtifactKey) -> Result<ArtifactPrompt, HypothesisError> {
        let user_id = &scope.hypothesis.user_id;
        let mut context = ArtifactPrompt {
            kind: key.kind.label().to_string(),
            hypothesis_title: scope.hypothesis.title.clone(),
            hypothesis_description: scope.hypothesis.description.clone(),
            prior: Vec::new(),
            segment: None,
            channel: None,
        };

        match key.kind {
            ArtifactKind::Core => {}
            ArtifactKind::GtmDetailedChannel => {
                let (segment, channel) = self.channel_subjects(key, user_id).await?;
                context.segment = Some(segment);
                context.channel = Some(channel);
                for kind in [ArtifactKind::Core, ArtifactKind::Gtm] {
                    if let Some(prior) = self.prior(&key.hypothesis_id, kind, user_id).await? {
                        context.prior.push(prior);
                    }
                }
            }
            _ => {
                if let Some(prior) = self.prior(&key.hypothesis_id, ArtifactKind::Core, user_id).await? {
                    context.prior.push(prior);
                }
            }
        }
        Ok(context)
    }

    async fn prior(
        &self,
        hypothesis_id: &str,
        kind: ArtifactKind,
        user_id: &str,
    ) -> Result<Option<PriorArtifact>, HypothesisError> {
        let key = ArtifactKey::new(hypothesis_id, kind);
        match self.store.find_artifact(&key, user_id).await? {
            Some(artifact) => Ok(Some(PriorArtifact {
                kind: kind.label().to_string(),
                content: pretty(&artifact.content)?,
            })),
            None => Ok(None),
        }
    }

    /// Segment and channel a detailed-channel key points at
    async fn channel_subjects(&self, key: &ArtifactKey, user_id: &str) -> Result<(Subject, Subject), HypothesisError> {
        let Some(scope) = key.channel.as_ref().filter(|_| key.is_well_formed()) else {
            return Err(HypothesisError::NotFound(format!("channel scope of {}", key)));
        };

        let core = self
            .store
            .find_artifact(&ArtifactKey::new(&key.hypothesis_id, ArtifactKind::Core), user_id)
            .await?;
        let segment = core
            .as_ref()
            .and_then(|a| a.content.as_core())
            .and_then(|c| c.segment(&scope.segment_id))
            .ok_or_else(|| HypothesisError::NotFound(format!("customer segment {}", scope.segment_id)))?;

        let gtm = self
            .store
            .find_artifact(&ArtifactKey::new(&key.hypothesis_id, ArtifactKind::Gtm), user_id)
            .await?;
        let channel = gtm
            .as_ref()
            .and_then(|a| a.content.as_gtm())
            .and_then(|g| g.channel(&scope.channel_id))
            .ok_or_else(|| HypothesisError::NotFound(format!("gtm channel {}", scope.channel_id)))?;

        Ok((
            Subject {
                name: segment.name.clone(),
                description: segment.description.clone(),
            },
            Subject {
                name: channel.name.clone(),
                description: channel.description.clone(),
            },
        ))
    }

    /// Keep person profiles in line with Core segments after a Core change
    ///
    /// New segments get a job; profiles of removed segments are deleted.
    /// Failures here are logged, the artifact is already stored.
    async fn sync_profiles(&self, artifact: &Artifact, previous: Option<&ArtifactContent>) {
        let Some(core) = artifact.content.as_core() else {
            return;
        };
        let previous_ids = segment_ids(previous.and_then(|p| p.as_core()));
        let current_ids = segment_ids(Some(core));

        let removed: Vec<String> = previous_ids.difference(&current_ids).cloned().collect();
        if !removed.is_empty() {
            match self
                .store
                .delete_person_profiles(&artifact.key.hypothesis_id, &artifact.user_id, &removed)
                .await
            {
                Ok(deleted) => info!(hypothesis_id = %artifact.key.hypothesis_id, %deleted, "Removed obsolete person profiles"),
                Err(e) => warn!(hypothesis_id = %artifact.key.hypothesis_id, error = %e, "Failed to remove obsolete person profiles"),
            }
        }

        for segment in &core.customer_segments {
            if segment.id.as_ref().is_some_and(|id| previous_ids.contains(id)) {
                continue;
            }
            let Some(job) = PersonProfileJob::for_segment(&artifact.key.hypothesis_id, &artifact.user_id, segment) else {
                continue;
            };
            let segment_id = job.segment_id.clone();
            match self.profiles.submit(job) {
                Ok(()) => debug!(%segment_id, "sync_profiles: job submitted"),
                Err(e) => warn!(%segment_id, error = %e, "Failed to submit person profile job"),
            }
        }
    }
}

fn check_key(key: &ArtifactKey) -> Result<(), HypothesisError> {
    if key.is_well_formed() {
        return Ok(());
    }
    Err(HypothesisError::NotFound(format!("artifact key {} is missing its channel scope or has one it cannot use", key)))
}

fn segment_ids(core: Option<&CoreContent>) -> HashSet<String> {
    core.map(|c| c.customer_segments.iter().filter_map(|s| s.id.clone()).collect())
        .unwrap_or_default()
}

fn pretty(content: &ArtifactContent) -> Result<String, HypothesisError> {
    content
        .to_value()
        .and_then(|v| serde_json::to_string_pretty(&v))
        .map_err(|e| HypothesisError::Store(format!("cannot serialize {} content: {}", content.kind(), e)))
}

/// Overlay a manual edit onto current content and check the result
fn apply_edit(current: &ArtifactContent, patch: Value) -> Result<ArtifactContent, HypothesisError> {
    let kind = current.kind();
    if !patch.is_object() {
        return Err(HypothesisError::InvalidEdit(format!("{} edit must be a JSON object", kind)));
    }
    let mut merged = current
        .to_value()
        .map_err(|e| HypothesisError::Store(format!("cannot serialize {} content: {}", kind, e)))?;
    overlay(&mut merged, patch);

    // the typed mapping accepts client id aliases; the schema check runs on its canonical form
    let content = ArtifactContent::from_value(kind, merged).map_err(|e| HypothesisError::InvalidEdit(e.to_string()))?;
    let canonical = content
        .to_value()
        .map_err(|e| HypothesisError::InvalidEdit(e.to_string()))?;
    OutputSchema::Artifact(kind)
        .validate(&canonical)
        .map_err(|e| HypothesisError::InvalidEdit(e.to_string()))?;
    Ok(content)
}
