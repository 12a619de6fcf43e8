//! TOML Configuration File Support
//!
//! Centralized configuration loading for chorus, from a TOML file at
//! `~/.config/chorus/chorus.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - config: `$XDG_CONFIG_HOME/chorus/chorus.toml`
//! - transcript: `$XDG_DATA_HOME/chorus/transcript.json`
//! - masks: `$XDG_DATA_HOME/chorus/masks.json`
//!
//! # Example Configuration
//!
//! ```toml
//! [chat]
//! system_prompt = "Answer concisely."
//! history_turns = 20
//! temperature = 0.7
//! mask = "Reviewer"
//!
//! [store]
//! path = "/home/me/.local/share/chorus/transcript.json"
//! masks_path = "/home/me/.local/share/chorus/masks.json"
//!
//! [stream]
//! channel_capacity = 100
//!
//! [[providers]]
//! id = "ollama"
//! kind = "ollama"
//! model = "llama3.2"
//! host = "localhost"
//! port = 11434
//!
//! [[providers]]
//! id = "echo"
//! kind = "scripted"
//! script = ["Hello ", "from a script.\n"]
//! enabled = false
//! ```
//!
//! When the file declares any `[[providers]]`, they replace the default
//! provider list entirely. A selected `mask` (name or ID) takes precedence over
//! `system_prompt` once it is resolved against the mask store.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::ProviderId;
use crate::orchestrator::{EnabledProvider, OrchestratorConfig};
use crate::provider::{BackendConfig, OllamaProvider, ScriptedProvider, DEFAULT_OLLAMA_PORT};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// System prompt sent with every request
    pub system_prompt: Option<String>,

    /// Committed turns loaded as context on startup
    pub history_turns: Option<usize>,

    /// Sampling temperature (0.0-1.0)
    pub temperature: Option<f32>,

    /// Maximum answer tokens (0 = provider default)
    pub max_tokens: Option<u32>,

    /// Mask selected by name or ID
    pub mask: Option<String>,
}

/// Store section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// Transcript file path
    pub path: Option<PathBuf>,

    /// Mask presets file path
    pub masks_path: Option<PathBuf>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Provider event channel capacity
    pub channel_capacity: Option<usize>,
}

/// Provider implementation selected by a `[[providers]]` entry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Ollama HTTP server
    #[default]
    Ollama,
    /// Fixed in-process script
    Scripted,
}

/// One `[[providers]]` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderToml {
    /// Stable provider key
    pub id: String,

    /// Implementation to use
    #[serde(default)]
    pub kind: ProviderKind,

    /// Model name passed in requests
    pub model: Option<String>,

    /// Ollama host
    pub host: Option<String>,

    /// Ollama port
    pub port: Option<u16>,

    /// Whether the provider takes part in turns
    pub enabled: Option<bool>,

    /// Chunks replayed by a scripted provider
    #[serde(default)]
    pub script: Vec<String>,

    /// Error a scripted provider ends with instead of `Done`
    pub fail_with: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusToml {
    /// Chat configuration section
    pub chat: ChatToml,

    /// Store configuration section
    pub store: StoreToml,

    /// Stream configuration section
    pub stream: StreamToml,

    /// Provider entries in declaration order
    pub providers: Vec<ProviderToml>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved settings for one provider
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    /// Stable provider key
    pub id: ProviderId,
    /// Model name passed in requests
    pub model: String,
    /// Connection details
    pub backend: BackendConfig,
    /// Whether the provider takes part in turns
    pub enabled: bool,
}

impl ProviderSettings {
    fn from_toml(entry: &ProviderToml) -> Self {
        let backend = match entry.kind {
            ProviderKind::Ollama => BackendConfig::ollama(
                entry.host.clone().unwrap_or_else(|| "localhost".to_string()),
                entry.port.unwrap_or(DEFAULT_OLLAMA_PORT),
            ),
            ProviderKind::Scripted => BackendConfig::Scripted {
                chunks: entry.script.clone(),
                fail_with: entry.fail_with.clone(),
            },
        };

        Self {
            id: ProviderId::new(entry.id.clone()),
            model: entry.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            backend,
            enabled: entry.enabled.unwrap_or(true),
        }
    }
}

/// Model used when a provider entry names none
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Centralized configuration for chorus
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct ChorusConfig {
    /// System prompt sent with every request
    pub system_prompt: Option<String>,

    /// Committed turns loaded as context on startup
    pub history_turns: usize,

    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,

    /// Maximum answer tokens (0 = provider default)
    pub max_tokens: u32,

    /// Transcript file path
    pub store_path: PathBuf,

    /// Mask presets file path
    pub masks_path: PathBuf,

    /// Mask selected by name or ID
    pub mask: Option<String>,

    /// Provider event channel capacity
    pub channel_capacity: usize,

    /// Providers in declaration order, enabled or not
    pub providers: Vec<ProviderSettings>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            history_turns: 20,
            temperature: 0.7,
            max_tokens: 0,
            store_path: default_store_path(),
            masks_path: default_masks_path(),
            mask: None,
            channel_capacity: 100,
            providers: vec![ProviderSettings {
                id: ProviderId::from("ollama"),
                model: DEFAULT_MODEL.to_string(),
                backend: BackendConfig::default(),
                enabled: true,
            }],
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChorusConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Enabled providers in declaration order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Request parameters shared by every provider
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Instantiate every enabled provider
    ///
    /// # Errors
    ///
    /// Returns an error if a provider client cannot be created or a provider
    /// uses a custom backend this crate cannot build.
    pub fn build_providers(&self) -> anyhow::Result<Vec<EnabledProvider>> {
        self.enabled_providers()
            .map(|settings| {
                let provider: Arc<dyn crate::provider::CompletionProvider> = match &settings.backend
                {
                    BackendConfig::Ollama { host, port } => Arc::new(
                        OllamaProvider::new(host.clone(), *port)?
                            .with_channel_capacity(self.channel_capacity),
                    ),
                    backend @ BackendConfig::Scripted { .. } => Arc::new(
                        ScriptedProvider::from_config(backend).unwrap_or_default(),
                    ),
                    BackendConfig::Custom { name, .. } => {
                        anyhow::bail!("Provider {} uses unsupported backend {name}", settings.id)
                    }
                };
                Ok(EnabledProvider::new(
                    settings.id.clone(),
                    settings.model.clone(),
                    provider,
                ))
            })
            .collect()
    }

    /// Check cross-field invariants
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] on duplicate provider IDs, no
    /// enabled provider, a zero channel capacity or an out-of-range temperature.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.as_str().trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "provider id must not be empty".to_string(),
                ));
            }
            if !seen.insert(provider.id.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider id: {}",
                    provider.id
                )));
            }
        }
        if self.enabled_providers().next().is_none() {
            return Err(ConfigError::ValidationError(
                "at least one provider must be enabled".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "chat.temperature must be within 0.0-1.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chorus/chorus.toml` or
/// `~/.config/chorus/chorus.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chorus").join("chorus.toml"))
}

/// Get the default transcript path
#[must_use]
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("chorus")
        .join("transcript.json")
}

/// Get the default mask presets path
#[must_use]
pub fn default_masks_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("chorus")
        .join("masks.json")
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// merged configuration is invalid. A missing config file is not an error.
pub fn load_config() -> Result<ChorusConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChorusConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// the merged configuration is invalid.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ChorusConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChorusConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChorusToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChorusConfig, toml: &ChorusToml) {
    if toml.chat.system_prompt.is_some() {
        config.system_prompt = toml.chat.system_prompt.clone();
    }
    if let Some(turns) = toml.chat.history_turns {
        config.history_turns = turns;
    }
    if let Some(temperature) = toml.chat.temperature {
        config.temperature = temperature;
    }
    if let Some(max_tokens) = toml.chat.max_tokens {
        config.max_tokens = max_tokens;
    }
    if toml.chat.mask.is_some() {
        config.mask = toml.chat.mask.clone();
    }

    if let Some(ref path) = toml.store.path {
        config.store_path = path.clone();
    }
    if let Some(ref path) = toml.store.masks_path {
        config.masks_path = path.clone();
    }

    if let Some(capacity) = toml.stream.channel_capacity {
        config.channel_capacity = capacity;
    }

    if !toml.providers.is_empty() {
        config.providers = toml.providers.iter().map(ProviderSettings::from_toml).collect();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ChorusConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env("CHORUS_STORE_PATH") {
        config.store_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Some(path) = env("CHORUS_MASKS_PATH") {
        config.masks_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Some(mask) = env("CHORUS_MASK").filter(|m| !m.trim().is_empty()) {
        config.mask = Some(mask);
        config.source = ConfigSource::Env;
    }
    if let Some(prompt) = env("CHORUS_SYSTEM_PROMPT") {
        config.system_prompt = Some(prompt);
        config.source = ConfigSource::Env;
    }
    if let Some(turns) = env("CHORUS_HISTORY_TURNS") {
        if let Ok(n) = turns.parse::<usize>() {
            config.history_turns = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(list) = env("CHORUS_PROVIDERS") {
        enable_only(config, &parse_provider_list(&list));
        config.source = ConfigSource::Env;
    }

    let host = env("OLLAMA_HOST");
    let port = env("OLLAMA_PORT").and_then(|p| p.parse::<u16>().ok());
    if host.is_some() || port.is_some() {
        for provider in &mut config.providers {
            if let BackendConfig::Ollama {
                host: ref mut h,
                port: ref mut p,
            } = provider.backend
            {
                if let Some(ref host) = host {
                    h.clone_from(host);
                }
                if let Some(port) = port {
                    *p = port;
                }
            }
        }
        config.source = ConfigSource::Env;
    }
}

/// Split a comma separated provider list
fn parse_provider_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Enable exactly the listed providers
fn enable_only(config: &mut ChorusConfig, ids: &[String]) {
    for provider in &mut config.providers {
        provider.enabled = ids.iter().any(|id| id == provider.id.as_str());
    }
    for id in ids {
        if !config.providers.iter().any(|p| p.id.as_str() == id) {
            tracing::warn!(provider = %id, "Ignoring unknown provider in enabled list");
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Transcript path override
    pub store_path: Option<PathBuf>,

    /// Enabled provider list override
    pub providers: Option<Vec<String>>,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Mask selection override
    pub mask: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set transcript path override
    #[must_use]
    pub fn with_store_path(mut self, path: PathBuf) -> Self {
        self.store_path = Some(path);
        self
    }

    /// Set enabled provider list override from a comma separated string
    #[must_use]
    pub fn with_providers(mut self, list: &str) -> Self {
        self.providers = Some(parse_provider_list(list));
        self
    }

    /// Set system prompt override
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    /// Set mask selection override
    #[must_use]
    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the overridden configuration is invalid.
    pub fn apply(&self, config: &mut ChorusConfig) -> Result<(), ConfigError> {
        if self.store_path.is_some()
            || self.providers.is_some()
            || self.system_prompt.is_some()
            || self.mask.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref path) = self.store_path {
            config.store_path = path.clone();
        }
        if let Some(ref ids) = self.providers {
            enable_only(config, ids);
        }
        if let Some(ref prompt) = self.system_prompt {
            config.system_prompt = Some(prompt.clone());
        }
        if let Some(ref mask) = self.mask {
            config.mask = Some(mask.clone());
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ChorusConfig::default();

        assert_eq!(config.history_turns, 20);
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].id.as_str(), "ollama");
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
        assert!(config.store_path.ends_with("chorus/transcript.json"));
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("chorus/chorus.toml"));
        }
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[chat]
system_prompt = "Be brief."
history_turns = 5
temperature = 0.2

[store]
path = "/tmp/chorus-test/transcript.json"

[stream]
channel_capacity = 8

[[providers]]
id = "local"
kind = "ollama"
model = "qwen2.5"
port = 9999

[[providers]]
id = "echo"
kind = "scripted"
script = ["a", "b"]
enabled = false
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.history_turns, 5);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.store_path, PathBuf::from("/tmp/chorus-test/transcript.json"));
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].model, "qwen2.5");
        assert_eq!(
            config.providers[0].backend,
            BackendConfig::ollama("localhost", 9999)
        );
        assert_eq!(
            config.providers[1].backend,
            BackendConfig::Scripted {
                chunks: vec!["a".to_string(), "b".to_string()],
                fail_with: None,
            }
        );
        assert_eq!(config.enabled_providers().count(), 1);
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_parse_empty_toml() {
        let file = write_toml("");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.history_turns, 20);
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/path/chorus.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[chat\nhistory_turns = \"x\"");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_errors() {
        let file = write_toml(
            r#"
[[providers]]
id = "a"
[[providers]]
id = "a"
"#,
        );
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("duplicate")));

        let file = write_toml(
            r#"
[[providers]]
id = "a"
enabled = false
"#,
        );
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let file = write_toml("[stream]\nchannel_capacity = 0\n");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("channel_capacity")));
    }

    // =========================================================================
    // Priority Ordering Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml(
            r#"
[chat]
history_turns = 3

[[providers]]
id = "ollama"
[[providers]]
id = "echo"
kind = "scripted"
"#,
        );
        let env = env_from(&[
            ("CHORUS_HISTORY_TURNS", "9"),
            ("CHORUS_PROVIDERS", "echo"),
            ("CHORUS_STORE_PATH", "/tmp/env.json"),
            ("OLLAMA_HOST", "gpu-box"),
            ("OLLAMA_PORT", "8080"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.history_turns, 9);
        assert_eq!(config.store_path, PathBuf::from("/tmp/env.json"));
        let enabled: Vec<&str> = config.enabled_providers().map(|p| p.id.as_str()).collect();
        assert_eq!(enabled, vec!["echo"]);
        assert_eq!(config.providers[0].backend, BackendConfig::ollama("gpu-box", 8080));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_invalid_env_number_is_ignored() {
        let env = env_from(&[("CHORUS_HISTORY_TURNS", "lots")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.history_turns, 20);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = env_from(&[("CHORUS_STORE_PATH", "/tmp/env.json")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_store_path(PathBuf::from("/tmp/cli.json"))
            .with_system_prompt("cli prompt".to_string())
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/tmp/cli.json"));
        assert_eq!(config.system_prompt.as_deref(), Some("cli prompt"));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_mask_selection_priority() {
        let file = write_toml(
            r#"
[chat]
mask = "Reviewer"

[store]
masks_path = "/tmp/file-masks.json"
"#,
        );
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.mask.as_deref(), Some("Reviewer"));
        assert_eq!(config.masks_path, PathBuf::from("/tmp/file-masks.json"));

        let env = env_from(&[("CHORUS_MASK", "Poet"), ("CHORUS_MASKS_PATH", "/tmp/env-masks.json")]);
        let mut config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.mask.as_deref(), Some("Poet"));
        assert_eq!(config.masks_path, PathBuf::from("/tmp/env-masks.json"));

        ConfigOverrides::new().with_mask("2").apply(&mut config).unwrap();
        assert_eq!(config.mask.as_deref(), Some("2"));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_overrides_can_invalidate() {
        let mut config = ChorusConfig::default();
        let err = ConfigOverrides::new()
            .with_providers("nobody")
            .apply(&mut config)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = ChorusConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_build_providers() {
        let mut config = ChorusConfig::default();
        config.providers.push(ProviderSettings {
            id: ProviderId::from("echo"),
            model: "script".to_string(),
            backend: BackendConfig::Scripted {
                chunks: vec!["hi".to_string()],
                fail_with: None,
            },
            enabled: true,
        });

        let providers = config.build_providers().unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].provider.name(), "Ollama");
        assert_eq!(providers[1].provider.name(), "Scripted");
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ValidationError("bad".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bad");
    }
}
