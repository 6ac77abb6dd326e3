//! Configuration loading, validation, and management for Policy Agent.
//!
//! Loads configuration from `~/.policy-agent/config.toml`, then applies
//! environment variable overrides. The resulting [`AppConfig`] is passed
//! explicitly to the provider, the tool adapters and the agent loop; nothing
//! reads the environment after startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.policy-agent/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model service
    #[serde(default)]
    pub llm: LlmConfig,

    /// Agent loop limits and prompt
    #[serde(default)]
    pub agent: AgentConfig,

    /// Policy search backend
    #[serde(default)]
    pub search: SearchConfig,

    /// Baidu translation backend
    #[serde(default)]
    pub translate: TranslateConfig,

    /// SMTP email backend
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible completion endpoint base
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// The API key, unless absent or still a template placeholder.
    pub fn api_key(&self) -> Option<&str> {
        usable(&self.api_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of reasoning steps per run
    #[serde(default = "default_step_budget")]
    pub step_budget: u32,

    /// Unknown-tool calls tolerated in a row before the run fails
    #[serde(default = "default_failure_limit")]
    pub consecutive_tool_failure_limit: u32,

    /// Replaces the built-in policy assistant prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_step_budget() -> u32 {
    12
}
fn default_failure_limit() -> u32 {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            consecutive_tool_failure_limit: default_failure_limit(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// DuckDuckGo region code
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_search_endpoint() -> String {
    "https://api.duckduckgo.com/".into()
}
fn default_region() -> String {
    "cn-zh".into()
}
fn default_max_results() -> usize {
    5
}
fn default_tool_timeout() -> u64 {
    15
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            region: default_region(),
            max_results: default_max_results(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_target_lang")]
    pub default_target_lang: String,

    #[serde(default = "default_source_lang")]
    pub default_source_lang: String,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_translate_endpoint() -> String {
    "https://fanyi-api.baidu.com/api/trans/vip/translate".into()
}
fn default_target_lang() -> String {
    "zh".into()
}
fn default_source_lang() -> String {
    "auto".into()
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            secret_key: None,
            endpoint: default_translate_endpoint(),
            default_target_lang: default_target_lang(),
            default_source_lang: default_source_lang(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl TranslateConfig {
    /// `(app_id, secret_key)` when both are usable.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((usable(&self.app_id)?, usable(&self.secret_key)?))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP login, also the sender address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// SMTP password or authorization code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// 465 selects implicit TLS, anything else STARTTLS
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_recipient: Option<String>,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_to_name")]
    pub to_name: String,

    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_host() -> String {
    "smtp.qq.com".into()
}
fn default_smtp_port() -> u16 {
    465
}
fn default_from_name() -> String {
    "Policy Agent".into()
}
fn default_to_name() -> String {
    "User".into()
}
fn default_smtp_timeout() -> u64 {
    30
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            default_recipient: None,
            from_name: default_from_name(),
            to_name: default_to_name(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

impl EmailConfig {
    /// `(user, password)` when both are usable.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((usable(&self.user)?, usable(&self.password)?))
    }

    pub fn default_recipient(&self) -> Option<&str> {
        usable(&self.default_recipient)
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for TranslateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateConfig")
            .field("app_id", &self.app_id)
            .field("secret_key", &redact(&self.secret_key))
            .field("endpoint", &self.endpoint)
            .field("default_target_lang", &self.default_target_lang)
            .field("default_source_lang", &self.default_source_lang)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("default_recipient", &self.default_recipient)
            .field("from_name", &self.from_name)
            .field("to_name", &self.to_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Whether a value is still the `.env` template placeholder
/// (e.g. `your_deepseek_api_key_here`).
pub fn is_placeholder(value: &str) -> bool {
    value.contains("your_") && value.contains("_here")
}

fn usable(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !is_placeholder(v))
}

/// State of one credential, as reported by `doctor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Configured,
    Missing,
    Placeholder,
}

impl CredentialStatus {
    fn of(value: &Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            None | Some("") => Self::Missing,
            Some(v) if is_placeholder(v) => Self::Placeholder,
            Some(_) => Self::Configured,
        }
    }
}

/// One credential entry in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Environment variable that supplies it
    pub env_var: &'static str,
    /// What needs it
    pub used_by: &'static str,
    /// Whether the assistant cannot start without it
    pub required: bool,
    pub status: CredentialStatus,
}

impl AppConfig {
    /// Load configuration from the default path, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&Self::config_dir().join("config.toml"), |key| {
            std::env::var(key).ok()
        })
    }

    /// Load from `path` and apply overrides from `lookup`.
    ///
    /// `lookup` stands in for the environment so callers control the source.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment overrides (highest priority). Blank values are ignored.
    ///
    /// - `DEEPSEEK_API_KEY`, `DEEPSEEK_BASE_URL`, `POLICY_AGENT_MODEL`
    /// - `BAIDU_APP_ID`, `BAIDU_SECRET_KEY`
    /// - `QQ_EMAIL_USER`, `QQ_EMAIL_PASSWORD`, `TARGET_EMAIL`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("DEEPSEEK_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = var("DEEPSEEK_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = var("POLICY_AGENT_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("BAIDU_APP_ID") {
            self.translate.app_id = Some(v);
        }
        if let Some(v) = var("BAIDU_SECRET_KEY") {
            self.translate.secret_key = Some(v);
        }
        if let Some(v) = var("QQ_EMAIL_USER") {
            self.email.user = Some(v);
        }
        if let Some(v) = var("QQ_EMAIL_PASSWORD") {
            self.email.password = Some(v);
        }
        if let Some(v) = var("TARGET_EMAIL") {
            self.email.default_recipient = Some(v);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".policy-agent")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("llm.base_url must not be empty".into()));
        }

        if self.agent.step_budget < 1 {
            return Err(ConfigError::ValidationError(
                "agent.step_budget must be at least 1".into(),
            ));
        }

        if self.email.smtp_port == 0 {
            return Err(ConfigError::ValidationError("email.smtp_port must not be 0".into()));
        }

        Ok(())
    }

    /// The LLM API key, or the reason a chat cannot start without it.
    pub fn require_llm_key(&self) -> Result<&str, ConfigError> {
        match CredentialStatus::of(&self.llm.api_key) {
            CredentialStatus::Configured => self.llm.api_key().ok_or(ConfigError::MissingCredentials {
                name: "DEEPSEEK_API_KEY",
                reason: "not set".into(),
            }),
            CredentialStatus::Missing => Err(ConfigError::MissingCredentials {
                name: "DEEPSEEK_API_KEY",
                reason: "not set".into(),
            }),
            CredentialStatus::Placeholder => Err(ConfigError::MissingCredentials {
                name: "DEEPSEEK_API_KEY",
                reason: "still the template placeholder, update your .env file".into(),
            }),
        }
    }

    /// Every credential the assistant knows about, in a stable order.
    pub fn credential_report(&self) -> Vec<Credential> {
        let entry = |env_var, used_by, required, value: &Option<String>| Credential {
            env_var,
            used_by,
            required,
            status: CredentialStatus::of(value),
        };
        vec![
            entry("DEEPSEEK_API_KEY", "language model", true, &self.llm.api_key),
            entry("BAIDU_APP_ID", "baidu_translate", false, &self.translate.app_id),
            entry("BAIDU_SECRET_KEY", "baidu_translate", false, &self.translate.secret_key),
            entry("QQ_EMAIL_USER", "send_email", false, &self.email.user),
            entry("QQ_EMAIL_PASSWORD", "send_email", false, &self.email.password),
            entry("TARGET_EMAIL", "send_email default recipient", false, &self.email.default_recipient),
        ]
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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

    #[error("Missing credential {name}: {reason}")]
    MissingCredentials { name: &'static str, reason: String },
}
