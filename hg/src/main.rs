//! hypogen - business hypothesis generator
//!
//! CLI entry point: builds the orchestrator once and dispatches one command.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use hypogen::cli::{Cli, Command, HypothesisCommand, IdentityCommand, ProjectCommand, get_log_path};
use hypogen::config::Config;
use hypogen::orchestrator::{AmendRequest, Orchestrator, PersonProfileJob, ProfileQueue, Services, run_pending};
use hypogen::pipeline::TokioSleeper;
use hypogen::prompts::{PromptLoader, TemplatePrompts};
use hypogen::provider::create_provider;
use hypogen::state::{Persistence, StateManager};
use hypogen::{Hypothesis, Project};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store = StateManager::spawn(&config.storage.state_file).context("Failed to open state file")?;
    let user = cli.user.as_str();

    debug!(command = ?cli.command, %user, "main: dispatching command");
    let result = match cli.command {
        Command::Project {
            command: ProjectCommand::Create { title },
        } => cmd_project_create(&store, user, &title).await,
        Command::Hypothesis {
            command: HypothesisCommand::Create {
                project,
                title,
                description,
            },
        } => cmd_hypothesis_create(&store, user, &project, &title, &description).await,
        Command::Generate { target, extra } => {
            let key = target.key().map_err(|e| eyre!(e))?;
            let (orchestrator, mut jobs) = build_orchestrator(&config, &store)?;
            match key {
                Some(key) => print_json(&orchestrator.generate_artifact(&key, user, extra.as_deref()).await?)?,
                None => {
                    let results = orchestrator.generate_hypothesis(&target.hypothesis_id, user).await;
                    for (kind, result) in results {
                        match result {
                            Ok(artifact) => println!("{}: {}", kind, artifact.id),
                            Err(e) => println!("{}: failed: {}", kind, e),
                        }
                    }
                }
            }
            finish_profiles(&orchestrator, &mut jobs).await;
            Ok(())
        }
        Command::Regenerate { target, extra } => {
            let key = target
                .key()
                .map_err(|e| eyre!(e))?
                .ok_or_else(|| eyre!("regenerate needs --kind"))?;
            let (orchestrator, mut jobs) = build_orchestrator(&config, &store)?;
            print_json(&orchestrator.regenerate_artifact(&key, user, extra.as_deref()).await?)?;
            finish_profiles(&orchestrator, &mut jobs).await;
            Ok(())
        }
        Command::Amend {
            artifact_id,
            file,
            instruction,
        } => {
            let request = match (file, instruction) {
                (Some(path), _) => {
                    let text = fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?;
                    AmendRequest::Edit(serde_json::from_str(&text).context("Edit file is not valid JSON")?)
                }
                (None, Some(instruction)) => AmendRequest::Instruct(instruction),
                (None, None) => return Err(eyre!("amend needs --file or --instruction")),
            };
            let (orchestrator, mut jobs) = build_orchestrator(&config, &store)?;
            print_json(&orchestrator.amend_artifact(&artifact_id, user, request).await?)?;
            finish_profiles(&orchestrator, &mut jobs).await;
            Ok(())
        }
        Command::AddIdeas {
            artifact_id,
            count,
            hint,
        } => {
            let (orchestrator, _jobs) = build_orchestrator(&config, &store)?;
            print_json(
                &orchestrator
                    .add_content_ideas(&artifact_id, user, count, hint.as_deref())
                    .await?,
            )
        }
        Command::Show { hypothesis_id } => cmd_show(&store, user, &hypothesis_id).await,
        Command::Identity { command } => {
            let (orchestrator, _jobs) = build_orchestrator(&config, &store)?;
            cmd_identity(&store, &orchestrator, user, command).await
        }
    };

    store.shutdown().await.ok();
    result
}

/// Wire the orchestrator from config; profile jobs land in the returned queue
fn build_orchestrator(
    config: &Config,
    store: &StateManager,
) -> Result<(Orchestrator, UnboundedReceiver<PersonProfileJob>)> {
    debug!("build_orchestrator: called");
    config.validate()?;
    let provider = create_provider(&config.provider)?;
    let (queue, jobs) = ProfileQueue::new();
    let prompts = TemplatePrompts::new(PromptLoader::new(".hypogen/prompts"));

    let orchestrator = Orchestrator::new(
        Services {
            provider,
            store: Arc::new(store.clone()),
            prompts: Arc::new(prompts),
            profiles: Arc::new(queue),
            sleeper: Arc::new(TokioSleeper),
        },
        config,
    );
    Ok((orchestrator, jobs))
}

/// Generate the person profiles queued by the command before exiting
async fn finish_profiles(orchestrator: &Orchestrator, jobs: &mut UnboundedReceiver<PersonProfileJob>) {
    let stored = run_pending(orchestrator, jobs).await;
    if stored > 0 {
        println!("Generated {} person profile(s)", stored);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_project_create(store: &StateManager, user: &str, title: &str) -> Result<()> {
    debug!(%user, %title, "cmd_project_create: called");
    let project = Project::new(user, title);
    store.create_project(project.clone()).await?;
    print_json(&project)
}

async fn cmd_hypothesis_create(
    store: &StateManager,
    user: &str,
    project_id: &str,
    title: &str,
    description: &str,
) -> Result<()> {
    debug!(%user, %project_id, %title, "cmd_hypothesis_create: called");
    let hypothesis = Hypothesis::new(project_id, user, title, description);
    store.create_hypothesis(hypothesis.clone()).await?;
    print_json(&hypothesis)
}

async fn cmd_show(store: &StateManager, user: &str, hypothesis_id: &str) -> Result<()> {
    debug!(%user, %hypothesis_id, "cmd_show: called");
    let hypothesis = store
        .find_hypothesis(hypothesis_id, user)
        .await?
        .ok_or_else(|| eyre!("Hypothesis not found: {}", hypothesis_id))?;
    let artifacts = store.list_artifacts(hypothesis_id, user).await?;
    let profiles = store.list_person_profiles(hypothesis_id, user).await?;

    print_json(&serde_json::json!({
        "hypothesis": hypothesis,
        "artifacts": artifacts,
        "personProfiles": profiles,
    }))
}

async fn cmd_identity(
    store: &StateManager,
    orchestrator: &Orchestrator,
    user: &str,
    command: IdentityCommand,
) -> Result<()> {
    debug!(?command, "cmd_identity: called");
    let project_id = match &command {
        IdentityCommand::Repair { project_id } | IdentityCommand::Set { project_id, .. } => project_id.clone(),
    };
    let project = store
        .find_project(&project_id)
        .await?
        .filter(|p| p.user_id == user)
        .ok_or_else(|| eyre!("Project not found: {}", project_id))?;

    let token = match command {
        IdentityCommand::Repair { .. } => orchestrator.identities().repair_identity(&project).await?,
        IdentityCommand::Set { file, .. } => {
            let instructions =
                fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?;
            orchestrator.identities().set_instructions(&project, &instructions).await?
        }
    };
    println!("Project {} uses identity {}", project.id, token);
    Ok(())
}
