//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{ArtifactKey, ArtifactKind};

/// hypogen - business hypothesis generator
#[derive(Parser)]
#[command(
    name = "hg",
    about = "Generate business plans from hypotheses with a stateful assistant",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// User the operation runs as
    #[arg(short, long, global = true, default_value = "local")]
    pub user: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Manage hypotheses
    Hypothesis {
        #[command(subcommand)]
        command: HypothesisCommand,
    },

    /// Generate one artifact, or every per-hypothesis artifact when no kind is given
    Generate {
        #[command(flatten)]
        target: Target,

        /// Extra instruction for this run only
        #[arg(short, long)]
        extra: Option<String>,
    },

    /// Replace an artifact with a freshly generated one
    Regenerate {
        #[command(flatten)]
        target: Target,

        /// Extra instruction for this run only
        #[arg(short, long)]
        extra: Option<String>,
    },

    /// Change an artifact by JSON edit or by instruction
    Amend {
        /// Artifact ID
        artifact_id: String,

        /// JSON file with a partial edit
        #[arg(short, long, conflicts_with = "instruction", required_unless_present = "instruction")]
        file: Option<PathBuf>,

        /// Natural-language change request
        #[arg(short, long)]
        instruction: Option<String>,
    },

    /// Generate content ideas for a detailed channel
    AddIdeas {
        /// Artifact ID of a gtm-detailed-channel artifact
        artifact_id: String,

        /// Number of ideas to request
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// What the ideas should focus on
        #[arg(long)]
        hint: Option<String>,
    },

    /// Show a hypothesis with its artifacts and person profiles
    Show {
        /// Hypothesis ID
        hypothesis_id: String,
    },

    /// Manage the project's provider identity
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },
}

/// Project subcommands
#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Create a project
    Create {
        /// Project title
        title: String,
    },
}

/// Hypothesis subcommands
#[derive(Debug, Subcommand)]
pub enum HypothesisCommand {
    /// Create a hypothesis under a project
    Create {
        /// Project ID
        #[arg(short, long)]
        project: String,

        /// Hypothesis title
        title: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,
    },
}

/// Identity subcommands
#[derive(Debug, Subcommand)]
pub enum IdentityCommand {
    /// Recreate the project's identity, keeping its instructions
    Repair {
        /// Project ID
        project_id: String,
    },

    /// Replace the identity's instructions
    Set {
        /// Project ID
        project_id: String,

        /// File with the new instructions
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Which artifact a generate or regenerate applies to
#[derive(Debug, clap::Args)]
pub struct Target {
    /// Hypothesis ID
    pub hypothesis_id: String,

    /// Artifact kind (core, market-research, validation, packing, gtm, gtm-detailed-channel)
    #[arg(short, long)]
    pub kind: Option<ArtifactKind>,

    /// Customer segment ID (gtm-detailed-channel only)
    #[arg(long, requires = "channel")]
    pub segment: Option<String>,

    /// GTM channel ID (gtm-detailed-channel only)
    #[arg(long, requires = "segment")]
    pub channel: Option<String>,
}

impl Target {
    /// Key of the targeted artifact; `None` means every per-hypothesis kind
    pub fn key(&self) -> Result<Option<ArtifactKey>, String> {
        debug!(?self, "Target::key: called");
        let Some(kind) = self.kind else {
            if self.segment.is_some() {
                return Err("--segment/--channel need --kind gtm-detailed-channel".to_string());
            }
            return Ok(None);
        };

        let key = match (&self.segment, &self.channel) {
            (Some(segment), Some(channel)) => ArtifactKey::detailed_channel(&self.hypothesis_id, segment, channel),
            _ => ArtifactKey::new(&self.hypothesis_id, kind),
        };
        if key.kind != kind || !key.is_well_formed() {
            return Err(format!(
                "{} needs --segment and --channel exactly when it is gtm-detailed-channel",
                kind
            ));
        }
        Ok(Some(key))
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hypogen")
        .join("logs")
        .join("hypogen.log");
    debug!(?path, "get_log_path: returning path");
    path
}
