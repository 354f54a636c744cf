//! Identity migration
//!
//! A project's provider identity is checked before every use. Tokens in the
//! retired format are recreated; the original instructions are recovered
//! from the provider, then the cache, then the default template.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::HypothesisError;
use crate::config::IdentityConfig;
use crate::domain::Project;
use crate::locks::KeyedLocks;
use crate::prompts::PromptBuilder;
use crate::provider::{AssistantProvider, IdentitySpec};
use crate::state::Persistence;

/// Format of a stored identity token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityFormat {
    /// Retired format, always migrated
    Legacy,
    Current,
    /// Used as-is; the provider rejects it if it is really broken
    Unrecognized,
}

/// Classify a token by prefix alone
pub fn classify_token(token: &str, config: &IdentityConfig) -> IdentityFormat {
    if token.starts_with(&config.legacy_prefix) {
        IdentityFormat::Legacy
    } else if token.starts_with(&config.current_prefix) {
        IdentityFormat::Current
    } else {
        IdentityFormat::Unrecognized
    }
}

/// Where recovered instructions came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSource {
    Provider,
    Cache,
    Default,
}

/// Keeps project identities usable
pub struct IdentityMigrator {
    provider: Arc<dyn AssistantProvider>,
    store: Arc<dyn Persistence>,
    prompts: Arc<dyn PromptBuilder>,
    config: IdentityConfig,
    locks: KeyedLocks,
}

impl IdentityMigrator {
    pub fn new(
        provider: Arc<dyn AssistantProvider>,
        store: Arc<dyn Persistence>,
        prompts: Arc<dyn PromptBuilder>,
        config: IdentityConfig,
    ) -> Self {
        Self {
            provider,
            store,
            prompts,
            config,
            locks: KeyedLocks::new(),
        }
    }

    /// Identity token to run with, migrating or creating one when needed
    pub async fn ensure_identity(&self, project: &Project) -> Result<String, HypothesisError> {
        debug!(project_id = %project.id, token = ?project.identity_id, "ensure_identity: called");
        if let Some(token) = self.usable(project) {
            return Ok(token);
        }

        // concurrent callers for one project create a single identity
        let _guard = self.locks.acquire(&project.id).await;
        let project = self.reload(project).await?;
        if let Some(token) = self.usable(&project) {
            debug!(project_id = %project.id, %token, "ensure_identity: created concurrently");
            return Ok(token);
        }

        match project.identity_id.as_deref() {
            None => {
                info!(project_id = %project.id, "Project has no identity, creating one");
                self.recreate(&project, None, false).await
            }
            Some(token) => {
                info!(project_id = %project.id, %token, "Migrating legacy identity");
                self.recreate(&project, Some(token), false).await
            }
        }
    }

    /// Recreate an identity the provider rejected
    ///
    /// `project.identity_id` is the rejected token. If another caller already
    /// replaced it, the replacement is returned instead.
    pub async fn repair_identity(&self, project: &Project) -> Result<String, HypothesisError> {
        debug!(project_id = %project.id, token = ?project.identity_id, "repair_identity: called");
        let _guard = self.locks.acquire(&project.id).await;
        let current = self.reload(project).await?;
        if current.identity_id != project.identity_id
            && let Some(token) = self.usable(&current)
        {
            debug!(project_id = %project.id, %token, "repair_identity: already replaced");
            return Ok(token);
        }

        let token = project.identity_id.as_deref();
        let lookup = token.is_some_and(|t| classify_token(t, &self.config) != IdentityFormat::Legacy);
        warn!(project_id = %project.id, ?token, "Repairing project identity");
        self.recreate(&current, token, lookup).await
    }

    /// Token that can be used without migration
    fn usable(&self, project: &Project) -> Option<String> {
        let token = project.identity_id.as_deref()?;
        match classify_token(token, &self.config) {
            IdentityFormat::Current => Some(token.to_string()),
            IdentityFormat::Unrecognized => {
                warn!(project_id = %project.id, %token, "Identity token has an unrecognized format, using it as-is");
                Some(token.to_string())
            }
            IdentityFormat::Legacy => None,
        }
    }

    /// Latest stored copy of the project
    async fn reload(&self, project: &Project) -> Result<Project, HypothesisError> {
        Ok(self
            .store
            .find_project(&project.id)
            .await?
            .unwrap_or_else(|| project.clone()))
    }

    /// Replace the identity's instructions and refresh the cache
    pub async fn set_instructions(&self, project: &Project, instructions: &str) -> Result<String, HypothesisError> {
        debug!(project_id = %project.id, "set_instructions: called");
        let token = self.ensure_identity(project).await?;
        self.provider.update_identity(&token, instructions).await?;
        self.cache(project, instructions).await;
        info!(project_id = %project.id, %token, "Updated identity instructions");
        Ok(token)
    }

    /// Instructions to recreate an identity with, in fallback order
    pub async fn recover_instructions(
        &self,
        project: &Project,
        token: Option<&str>,
        lookup_provider: bool,
    ) -> Result<(String, InstructionSource), HypothesisError> {
        debug!(project_id = %project.id, ?token, %lookup_provider, "recover_instructions: called");

        if lookup_provider && let Some(token) = token {
            match self.provider.get_identity(token).await {
                Ok(Some(instructions)) if !instructions.trim().is_empty() => {
                    return Ok((instructions, InstructionSource::Provider));
                }
                Ok(_) => debug!(%token, "recover_instructions: provider has no instructions"),
                Err(e) => warn!(%token, error = %e, "Identity lookup failed, trying the cache"),
            }
        }

        match self.store.cached_instructions(&project.id, &project.user_id).await {
            Ok(Some(instructions)) if !instructions.trim().is_empty() => {
                return Ok((instructions, InstructionSource::Cache));
            }
            Ok(_) => debug!(project_id = %project.id, "recover_instructions: nothing cached"),
            Err(e) => warn!(project_id = %project.id, error = %e, "Instructions cache unavailable, using the default"),
        }

        let instructions = self
            .prompts
            .identity_instructions(&project.title)
            .map_err(|e| HypothesisError::Prompt(e.to_string()))?;
        Ok((instructions, InstructionSource::Default))
    }

    async fn recreate(
        &self,
        project: &Project,
        token: Option<&str>,
        lookup_provider: bool,
    ) -> Result<String, HypothesisError> {
        let migration_error = |reason: String| HypothesisError::IdentityMigration {
            project_id: project.id.clone(),
            token: token.map(str::to_string),
            reason,
        };

        let (instructions, source) = self
            .recover_instructions(project, token, lookup_provider)
            .await
            .map_err(|e| migration_error(e.to_string()))?;
        debug!(?source, "recreate: recovered instructions");

        let spec = IdentitySpec {
            name: format!("{}-{}", self.config.name_prefix, project.title),
            instructions: instructions.clone(),
        };
        let new_token = self.provider.create_identity(&spec).await.map_err(|e| {
            error!(project_id = %project.id, ?token, error = %e, "Failed to create replacement identity");
            migration_error(format!("could not create identity: {}", e))
        })?;

        self.store
            .set_project_identity(&project.id, &new_token)
            .await
            .map_err(|e| {
                error!(project_id = %project.id, %new_token, error = %e, "Failed to store replacement identity");
                migration_error(format!("could not store new identity {}: {}", new_token, e))
            })?;

        self.cache(project, &instructions).await;
        info!(project_id = %project.id, old = ?token, new = %new_token, ?source, "Identity recreated");
        Ok(new_token)
    }

    async fn cache(&self, project: &Project, instructions: &str) {
        if let Err(e) = self
            .store
            .cache_instructions(&project.id, &project.user_id, instructions)
            .await
        {
            warn!(project_id = %project.id, error = %e, "Failed to cache identity instructions");
        }
    }
}
