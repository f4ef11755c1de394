//! Configuration loading, validation, and management for toolweave.
//!
//! Loads configuration from `~/.toolweave/config.toml` (or any TOML / JSON file
//! given explicitly) with environment variable overrides. Every string in the
//! file may reference the environment as `${VAR}` or `$VAR`. Validates all
//! settings at startup.

pub mod env;
pub mod servers;

pub use servers::{McpServerConfig, McpServers, TransportKind};

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TOOLWEAVE_CONFIG";

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// System prompt fragments, joined with newlines
    #[serde(
        default,
        alias = "main_prompts",
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub prompts: Vec<String>,

    /// Text-generation backend
    #[serde(default)]
    pub model: ModelConfig,

    /// End-user agent session settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Low-level round controller settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Tool providers, in priority order (later wins on name collisions)
    #[serde(default, alias = "mcpServers")]
    pub mcp_servers: McpServers,

    /// Polling secretary settings
    #[serde(default)]
    pub secretary: SecretaryConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("prompts", &self.prompts.len())
            .field("agent", &self.agent)
            .field("client", &self.client)
            .field("mcp_servers", &self.mcp_servers)
            .field("secretary", &self.secretary)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent to the backend
    #[serde(default = "default_model", alias = "model")]
    pub name: String,

    #[serde(default, alias = "key", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint root
    #[serde(default = "default_base_url", alias = "url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// HTTP timeout for one completion request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_key: None,
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model rounds allowed per user message
    #[serde(default = "default_agent_rounds")]
    pub max_rounds: u32,

    /// Tool requests executed per assistant turn; extras are dropped
    #[serde(default = "default_calls_per_message")]
    pub max_tool_calls_per_message: usize,

    /// Estimated-token budget that triggers history trimming
    #[serde(default = "default_history_budget")]
    pub history_budget_tokens: usize,

    /// Most recent turns always kept by trimming
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Trimming never runs on conversations this short
    #[serde(default = "default_min_turns")]
    pub min_turns_before_trim: usize,

    /// Expose the synthetic `batch_exec` tool
    #[serde(default = "default_true")]
    pub batch_tool: bool,

    /// Parse tool calls written as plain text when the model emits none
    #[serde(default)]
    pub text_call_fallback: bool,

    /// Consecutive failed model calls before a message is abandoned
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Assistant greeting recorded when a session starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}

fn default_agent_rounds() -> u32 {
    10
}
fn default_calls_per_message() -> usize {
    3
}
fn default_history_budget() -> usize {
    4000
}
fn default_keep_recent() -> usize {
    8
}
fn default_min_turns() -> usize {
    10
}
fn default_max_failures() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_agent_rounds(),
            max_tool_calls_per_message: default_calls_per_message(),
            history_budget_tokens: default_history_budget(),
            keep_recent: default_keep_recent(),
            min_turns_before_trim: default_min_turns(),
            batch_tool: true,
            text_call_fallback: false,
            max_consecutive_failures: default_max_failures(),
            welcome_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Model rounds allowed per prompt for unattended runs
    #[serde(default = "default_client_rounds")]
    pub max_rounds: u32,
}

fn default_client_rounds() -> u32 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_client_rounds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretaryConfig {
    /// Prompt sent on every polling tick
    #[serde(default = "default_secretary_prompt")]
    pub prompt: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pause after a failed tick before polling again
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

fn default_secretary_prompt() -> String {
    "Check for new incoming work, handle anything that needs a reply, and report what you did."
        .into()
}
fn default_poll_interval() -> u64 {
    60
}
fn default_error_backoff() -> u64 {
    10
}

impl Default for SecretaryConfig {
    fn default() -> Self {
        Self {
            prompt: default_secretary_prompt(),
            poll_interval_secs: default_poll_interval(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

/// Accept either `"prompt"` or `["part one", "part two"]`.
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help \
complete the user's request, and answer directly when they do not.";

impl AppConfig {
    /// Load configuration from `TOOLWEAVE_CONFIG` or the default path
    /// (`~/.toolweave/config.toml`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration from an explicit path when given, else as [`load`](Self::load).
    ///
    /// Also checks environment variables:
    /// - `TOOLWEAVE_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `TOOLWEAVE_BASE_URL`
    /// - `TOOLWEAVE_MODEL`
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::resolve_path(),
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// `*.json` files are parsed as JSON, anything else as TOML. A missing
    /// file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };

        let config = parsed.map_err(|reason| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document, expanding environment placeholders first.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let raw: serde_json::Value = toml::from_str(content).map_err(|e| e.to_string())?;
        Self::from_raw(raw)
    }

    /// Parse a JSON document, expanding environment placeholders first.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        let raw: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        Self::from_raw(raw)
    }

    fn from_raw(mut raw: serde_json::Value) -> Result<Self, String> {
        env::expand_value(&mut raw);
        serde_json::from_value(raw).map_err(|e| e.to_string())
    }

    fn apply_env_overrides(&mut self) {
        if self.model.api_key.is_none() {
            self.model.api_key = std::env::var("TOOLWEAVE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("TOOLWEAVE_BASE_URL") {
            self.model.base_url = url;
        }

        if let Ok(model) = std::env::var("TOOLWEAVE_MODEL") {
            self.model.name = model;
        }
    }

    /// The config path in effect when none is given explicitly.
    pub fn resolve_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolweave")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("model.name must not be empty".into()));
        }

        if self.agent.max_rounds == 0 || self.client.max_rounds == 0 {
            return Err(ConfigError::ValidationError("max_rounds must be at least 1".into()));
        }

        if self.agent.max_tool_calls_per_message == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_calls_per_message must be at least 1".into(),
            ));
        }

        for (name, server) in self.mcp_servers.enabled() {
            let reachable = match server.transport_kind() {
                TransportKind::Stdio => server.command.as_deref().is_some_and(|c| !c.is_empty()),
                TransportKind::Http => server.url.as_deref().is_some_and(|u| !u.is_empty()),
            };
            if !reachable {
                return Err(ConfigError::ValidationError(format!(
                    "mcp server '{name}' needs a command (stdio) or url (http)"
                )));
            }
            if server.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "mcp server '{name}' timeout_secs must be at least 1"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// The system prompt: configured fragments joined with newlines.
    pub fn system_prompt(&self) -> String {
        if self.prompts.is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            self.prompts.join("\n")
        }
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let mut config = Self::default();
        config.prompts = vec![DEFAULT_SYSTEM_PROMPT.to_string()];
        config.model.api_key = Some("${OPENAI_API_KEY}".into());
        let mut example = McpServerConfig::stdio(
            "npx",
            vec!["-y".into(), "@modelcontextprotocol/server-filesystem".into(), ".".into()],
        );
        example.disabled = true;
        config.mcp_servers.insert("filesystem", example);
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            prompts: Vec::new(),
            agent: AgentConfig::default(),
            client: ClientConfig::default(),
            mcp_servers: McpServers::new(),
            secretary: SecretaryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
