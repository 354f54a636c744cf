//! hypogen configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::ArtifactKind;

/// Main hypogen configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model provider configuration
    pub provider: ProviderConfig,

    /// Run polling configuration
    pub polling: PollingConfig,

    /// Provider identity format configuration
    pub identity: IdentityConfig,

    /// Generation budgets
    pub generation: GenerationConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Default log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the provider API key environment variable is set. Call this
    /// early in commands that talk to the provider.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.provider.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Provider API key not found. Set the {} environment variable.",
                self.provider.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .hypogen.yml
        let local_config = PathBuf::from(".hypogen.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/hypogen/hypogen.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("hypogen").join("hypogen.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Model attached to newly created identities
    pub model: String,

    /// HTTP request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// HTTP-level retries for transient statuses (0 leaves retrying to callers)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("{} is not set", self.api_key_env))
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            timeout_ms: 60_000,
            max_retries: 0,
        }
    }
}

/// Run polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between two status queries
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Wall-clock budget for one run
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Number of status queries that fit in the timeout (at least one)
    pub fn max_attempts(&self) -> u32 {
        if self.interval_ms == 0 {
            return 1;
        }
        ((self.timeout_ms / self.interval_ms).max(1)).min(u32::MAX as u64) as u32
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 60_000,
        }
    }
}

/// Provider identity format configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Prefix of tokens in the retired format; these are always migrated
    #[serde(rename = "legacy-prefix")]
    pub legacy_prefix: String,

    /// Prefix of tokens in the current format
    #[serde(rename = "current-prefix")]
    pub current_prefix: String,

    /// Prefix for names of newly created identities
    #[serde(rename = "name-prefix")]
    pub name_prefix: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            legacy_prefix: "ag:".to_string(),
            current_prefix: "asst_".to_string(),
            name_prefix: "hypogen".to_string(),
        }
    }
}

/// Token budgets for generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Default maximum completion tokens
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-kind overrides keyed by artifact kind label (e.g. `gtm-detailed-channel`)
    #[serde(rename = "max-tokens-by-kind")]
    pub max_tokens_by_kind: HashMap<String, u32>,
}

impl GenerationConfig {
    pub fn max_tokens_for(&self, kind: ArtifactKind) -> u32 {
        self.max_tokens_by_kind
            .get(kind.label())
            .copied()
            .unwrap_or(self.max_tokens)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            max_tokens_by_kind: HashMap::from([("gtm-detailed-channel".to_string(), 8192)]),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON state file for the local store
    #[serde(rename = "state-file")]
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/hypogen on Linux)
        let state_file = dirs::data_dir()
            .map(|d| d.join("hypogen"))
            .unwrap_or_else(|| PathBuf::from(".hypogen"))
            .join("state.json");

        Self { state_file }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.identity.legacy_prefix, "ag:");
        assert_eq!(config.provider.max_retries, 0);
    }

    #[test]
    fn test_polling_attempts() {
        let polling = PollingConfig {
            interval_ms: 500,
            timeout_ms: 30_000,
        };
        assert_eq!(polling.max_attempts(), 60);

        let tiny = PollingConfig {
            interval_ms: 1000,
            timeout_ms: 10,
        };
        assert_eq!(tiny.max_attempts(), 1);
    }

    #[test]
    fn test_max_tokens_overrides() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.max_tokens_for(ArtifactKind::Core), 4096);
        assert_eq!(generation.max_tokens_for(ArtifactKind::GtmDetailedChannel), 8192);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
provider:
  api-key-env: MY_KEY
  base-url: https://proxy.example.com
  model: gpt-4o-mini
  timeout-ms: 10000
  max-retries: 2

polling:
  interval-ms: 250
  timeout-ms: 20000

identity:
  legacy-prefix: "agent-"

generation:
  max-tokens: 2048
  max-tokens-by-kind:
    core: 3000

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.provider.api_key_env, "MY_KEY");
        assert_eq!(config.provider.base_url, "https://proxy.example.com");
        assert_eq!(config.provider.max_retries, 2);
        assert_eq!(config.polling.max_attempts(), 80);
        assert_eq!(config.identity.legacy_prefix, "agent-");
        assert_eq!(config.identity.current_prefix, "asst_");
        assert_eq!(config.generation.max_tokens_for(ArtifactKind::Core), 3000);
        assert_eq!(config.generation.max_tokens_for(ArtifactKind::Gtm), 2048);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
polling:
  timeout-ms: 5000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.polling.timeout_ms, 5000);
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.provider.base_url, "https://api.openai.com");
    }
}
