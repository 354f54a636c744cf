//! Integration tests for hypogen
//!
//! These drive the public orchestrator API end to end against an in-process
//! provider that answers every run with canned output for its schema.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use hypogen::config::Config;
use hypogen::orchestrator::{AmendRequest, Orchestrator, ProfileQueue, Services, spawn_profile_worker};
use hypogen::pipeline::InstantSleeper;
use hypogen::prompts::TemplatePrompts;
use hypogen::provider::{AssistantProvider, IdentitySpec, ProviderError, Resource, RunRequest, RunStatus};
use hypogen::state::{Persistence, StateManager};
use hypogen::{ArtifactKey, ArtifactKind, Hypothesis, Project};

// =============================================================================
// Canned provider
// =============================================================================

#[derive(Default)]
struct Inner {
    next_id: u32,
    threads: HashMap<String, Vec<String>>,
    runs: HashMap<String, (String, String)>,
    identities: HashMap<String, String>,
}

/// Completes every run at once with a fixed reply per schema name
#[derive(Default)]
struct CannedProvider {
    inner: Mutex<Inner>,
}

impl CannedProvider {
    fn identities_created(&self) -> usize {
        self.inner.lock().unwrap().identities.len()
    }

    fn next_id(inner: &mut Inner, prefix: &str) -> String {
        inner.next_id += 1;
        format!("{}_{}", prefix, inner.next_id)
    }

    fn reply_for(schema: &str) -> String {
        let value = match schema {
            "core" => json!({
                "problems": ["finding clients"],
                "customerSegments": [
                    { "id": null, "name": "Designers", "description": "solo designers" },
                    { "id": null, "name": "Developers", "description": "freelance developers" }
                ],
                "uniqueValueProposition": "Leads on autopilot",
                "solutions": ["matching"], "channels": ["LinkedIn"], "revenueStreams": ["subscription"],
                "costStructure": ["hosting"], "keyMetrics": ["signups"], "unfairAdvantage": "network"
            }),
            "market-research" => json!({
                "marketSize": { "tam": "1B", "sam": "100M", "som": "5M" },
                "trends": [{ "name": "remote work", "description": "more freelancers" }],
                "competitors": [{ "name": "Upwork", "description": "marketplace", "strengths": ["reach"], "weaknesses": ["fees"] }],
                "opportunities": ["niche focus"], "risks": ["platform risk"]
            }),
            "validation" => json!({
                "assumptions": ["freelancers pay for leads"],
                "interviewQuestions": ["How do you find clients?"],
                "experiments": [{ "name": "landing page", "description": "collect emails", "successCriteria": "100 signups" }],
                "channels": ["Reddit"]
            }),
            "packing" => json!({
                "headline": "Never chase clients again", "subheadline": "Leads delivered weekly",
                "benefits": [{ "title": "Save time", "description": "no cold outreach" }],
                "callToAction": "Join the waitlist", "socialProof": ["50 beta users"]
            }),
            "gtm" => json!({
                "validate": { "goal": "first 10 customers", "channels": [
                    { "id": null, "name": "LinkedIn", "description": "posts", "status": "Planned", "kpis": "10 leads" }
                ]},
                "buildAudience": { "goal": "1k followers", "channels": [] },
                "scale": { "goal": "100 customers", "channels": [] }
            }),
            "gtm-detailed-channel" => json!({
                "preparationTasks": [{ "id": null, "text": "polish profile", "completed": false }],
                "contentIdeas": [{ "id": null, "title": "Case study", "description": "before and after" }],
                "actionPlan": [{ "id": null, "title": "Week 1", "description": "start posting",
                    "tasks": [{ "id": null, "text": "post twice", "completed": false }] }],
                "metricsAndKpis": [{ "id": null, "metric": "inbound leads", "kpi": "5 per week" }]
            }),
            "person-profile" => json!({
                "name": "Dana", "age": 31, "occupation": "Designer", "background": "ex-agency",
                "goals": ["steady income"], "pains": ["dry spells"], "behaviors": ["active on LinkedIn"],
                "quote": "I just want to design"
            }),
            _ => json!({}),
        };
        format!("Here you go:\n```json\n{}\n```", value)
    }
}

#[async_trait]
impl AssistantProvider for CannedProvider {
    async fn create_conversation(&self) -> Result<String, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Self::next_id(&mut inner, "thread");
        inner.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn post_message(&self, thread_id: &str, _text: &str) -> Result<(), ProviderError> {
        let inner = self.inner.lock().unwrap();
        if !inner.threads.contains_key(thread_id) {
            return Err(ProviderError::NotFound {
                resource: Resource::Thread,
                id: thread_id.to_string(),
            });
        }
        Ok(())
    }

    async fn trigger_run(
        &self,
        thread_id: &str,
        _identity_id: &str,
        request: &RunRequest,
    ) -> Result<String, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        let schema = request.schema.as_ref().map(|s| s.name.clone()).unwrap_or_default();
        let run_id = Self::next_id(&mut inner, "run");
        inner.runs.insert(run_id.clone(), (thread_id.to_string(), schema));
        Ok(run_id)
    }

    async fn get_run_status(&self, _thread_id: &str, run_id: &str) -> Result<RunStatus, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((thread_id, schema)) = inner.runs.remove(run_id) else {
            return Ok(RunStatus::Completed);
        };
        inner
            .threads
            .entry(thread_id)
            .or_default()
            .push(Self::reply_for(&schema));
        Ok(RunStatus::Completed)
    }

    async fn get_latest_message(&self, thread_id: &str) -> Result<String, ProviderError> {
        let inner = self.inner.lock().unwrap();
        inner
            .threads
            .get(thread_id)
            .and_then(|messages| messages.last().cloned())
            .ok_or_else(|| ProviderError::InvalidResponse("no reply".to_string()))
    }

    async fn create_identity(&self, spec: &IdentitySpec) -> Result<String, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Self::next_id(&mut inner, "asst");
        inner.identities.insert(id.clone(), spec.instructions.clone());
        Ok(id)
    }

    async fn get_identity(&self, identity_id: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.inner.lock().unwrap().identities.get(identity_id).cloned())
    }

    async fn update_identity(&self, identity_id: &str, instructions: &str) -> Result<(), ProviderError> {
        self.inner
            .lock()
            .unwrap()
            .identities
            .insert(identity_id.to_string(), instructions.to_string());
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn seed(store: &StateManager) -> (Project, Hypothesis) {
    let project = Project::new("u1", "Acme");
    store.create_project(project.clone()).await.expect("Failed to create project");
    let hypothesis = Hypothesis::new(&project.id, "u1", "Freelancers need leads", "");
    store
        .create_hypothesis(hypothesis.clone())
        .await
        .expect("Failed to create hypothesis");
    (project, hypothesis)
}

fn orchestrator(provider: Arc<CannedProvider>, store: &StateManager, queue: ProfileQueue) -> Orchestrator {
    Orchestrator::new(
        Services {
            provider,
            store: Arc::new(store.clone()),
            prompts: Arc::new(TemplatePrompts::embedded()),
            profiles: Arc::new(queue),
            sleeper: Arc::new(InstantSleeper),
        },
        &Config::default(),
    )
}

// =============================================================================
// End-to-end
// =============================================================================

#[tokio::test]
async fn test_generate_hypothesis_and_profiles() {
    let store = StateManager::in_memory();
    let (project, hypothesis) = seed(&store).await;
    let provider = Arc::new(CannedProvider::default());
    let (queue, jobs) = ProfileQueue::new();
    let orchestrator = Arc::new(orchestrator(provider.clone(), &store, queue));
    let worker = spawn_profile_worker(&orchestrator, jobs);

    let results = orchestrator.generate_hypothesis(&hypothesis.id, "u1").await;
    assert_eq!(results.len(), 5);
    for (kind, result) in &results {
        let artifact = result.as_ref().expect("Artifact generation failed");
        assert_eq!(artifact.kind(), *kind);
    }

    // each artifact has its own thread
    let artifacts = store.list_artifacts(&hypothesis.id, "u1").await.expect("Failed to list");
    let mut threads: Vec<&str> = artifacts.iter().map(|a| a.conversation_thread_id.as_str()).collect();
    threads.sort();
    threads.dedup();
    assert_eq!(threads.len(), 5);

    // the project got exactly one identity although five runs raced for it
    let project = store.find_project(&project.id).await.unwrap().expect("Project vanished");
    assert!(project.identity_id.expect("No identity").starts_with("asst_"));
    assert_eq!(provider.identities_created(), 1);

    // profiles arrive in the background
    let mut profiles = Vec::new();
    for _ in 0..200 {
        profiles = store.list_person_profiles(&hypothesis.id, "u1").await.unwrap();
        if profiles.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(profiles.len(), 2);

    let core = store
        .find_artifact(&ArtifactKey::new(&hypothesis.id, ArtifactKind::Core), "u1")
        .await
        .unwrap()
        .expect("Core missing");
    let segments = &core.content.as_core().unwrap().customer_segments;
    for profile in &profiles {
        assert!(segments.iter().any(|s| s.id.as_deref() == Some(profile.segment_id.as_str())));
    }

    // the worker winds down with the last orchestrator handle
    drop(orchestrator);
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("Profile worker did not stop")
        .expect("Profile worker panicked");
}

#[tokio::test]
async fn test_detailed_channel_edit_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let state_file = temp_dir.path().join("state.json");

    let store = StateManager::spawn(&state_file).expect("Failed to spawn store");
    let (_project, hypothesis) = seed(&store).await;
    let (queue, _jobs) = ProfileQueue::new();
    let orchestrator = orchestrator(Arc::new(CannedProvider::default()), &store, queue);

    let core = orchestrator
        .generate_artifact(&ArtifactKey::new(&hypothesis.id, ArtifactKind::Core), "u1", None)
        .await
        .expect("Core generation failed");
    let gtm = orchestrator
        .generate_artifact(&ArtifactKey::new(&hypothesis.id, ArtifactKind::Gtm), "u1", None)
        .await
        .expect("Gtm generation failed");

    let segment_id = core.content.as_core().unwrap().customer_segments[0].id.clone().unwrap();
    let channel = gtm.content.as_gtm().unwrap().validate.channels[0].clone();
    let channel_id = channel.id.clone().unwrap();

    // rename the channel, keeping its id
    let patch = json!({
        "validate": { "channels": [
            { "id": channel_id, "name": "LinkedIn Ads", "description": channel.description,
              "status": "InProgress", "kpis": channel.kpis }
        ]}
    });
    let amended = orchestrator
        .amend_artifact(&gtm.id, "u1", AmendRequest::Edit(patch))
        .await
        .expect("Edit failed");
    assert_eq!(amended.content.as_gtm().unwrap().validate.channels[0].id.as_deref(), Some(channel_id.as_str()));

    // the detailed channel still resolves through the preserved id
    let key = ArtifactKey::detailed_channel(&hypothesis.id, &segment_id, &channel_id);
    let detailed = orchestrator
        .generate_artifact(&key, "u1", None)
        .await
        .expect("Detailed channel generation failed");
    let plan = &detailed.content.as_detailed_channel().unwrap().action_plan;
    assert!(plan[0].id.is_some());
    assert!(plan[0].tasks[0].id.is_some());

    store.shutdown().await.expect("Failed to shut down");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reopened = StateManager::spawn(&state_file).expect("Failed to reopen store");
    let stored = reopened
        .get_artifact(&gtm.id, "u1")
        .await
        .unwrap()
        .expect("Gtm lost on restart");
    let stored_channel = &stored.content.as_gtm().unwrap().validate.channels[0];
    assert_eq!(stored_channel.id.as_deref(), Some(channel_id.as_str()));
    assert_eq!(stored_channel.name, "LinkedIn Ads");
}
