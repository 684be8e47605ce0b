use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TriageError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub action_log: ActionLogConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Provider search query selecting the messages a sweep looks at
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_review_folder")]
    pub review_folder: String,
    /// Calendars consulted for free/busy when proposing meeting times
    #[serde(default = "default_availability_calendars")]
    pub availability_calendars: Vec<String>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            query: default_query(),
            review_folder: default_review_folder(),
            availability_calendars: default_availability_calendars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassificationConfig {
    /// JSON category table; the built-in table is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_classify_temperature")]
    pub classify_temperature: f32,
    #[serde(default = "default_reply_temperature")]
    pub reply_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            classify_temperature: default_classify_temperature(),
            reply_temperature: default_reply_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default = "default_sign_off")]
    pub sign_off: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            sign_off: default_sign_off(),
        }
    }
}

/// Most messages a single sweep may process
pub const MAX_MESSAGE_LIMIT: usize = 100;

/// Upper bound for `retry.base_delay_ms` (five minutes)
pub const MAX_RETRY_BASE_DELAY_MS: u64 = 300_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogConfig {
    #[serde(default = "default_action_log_enabled")]
    pub enabled: bool,
    #[serde(default = "default_action_log_path")]
    pub path: PathBuf,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            enabled: default_action_log_enabled(),
            path: default_action_log_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_query() -> String {
    "in:inbox".to_string()
}

fn default_review_folder() -> String {
    "Review Later".to_string()
}

fn default_availability_calendars() -> Vec<String> {
    vec!["primary".to_string()]
}

fn default_message_limit() -> usize {
    5
}

fn default_interval_secs() -> u64 {
    300
}

fn default_api_base() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_classify_temperature() -> f32 {
    0.2
}

fn default_reply_temperature() -> f32 {
    0.5
}

fn default_sign_off() -> String {
    "The Team".to_string()
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    5000
}

fn default_action_log_enabled() -> bool {
    true
}

fn default_action_log_path() -> PathBuf {
    PathBuf::from("TODO.md")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.user_id.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "mailbox.user_id cannot be empty".to_string(),
            ));
        }
        if self.mailbox.review_folder.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "mailbox.review_folder cannot be empty".to_string(),
            ));
        }
        // Gmail treats '/' as label nesting
        if self.mailbox.review_folder.contains('/') {
            return Err(TriageError::ConfigError(
                "mailbox.review_folder cannot contain '/' character".to_string(),
            ));
        }
        if self.mailbox.availability_calendars.is_empty() {
            return Err(TriageError::ConfigError(
                "mailbox.availability_calendars must list at least one calendar".to_string(),
            ));
        }
        if self
            .mailbox
            .availability_calendars
            .iter()
            .any(|c| c.trim().is_empty())
        {
            return Err(TriageError::ConfigError(
                "mailbox.availability_calendars cannot contain empty strings".to_string(),
            ));
        }

        if self.sweep.message_limit == 0 {
            return Err(TriageError::ConfigError(
                "sweep.message_limit must be at least 1".to_string(),
            ));
        }
        if self.sweep.message_limit > MAX_MESSAGE_LIMIT {
            return Err(TriageError::ConfigError(format!(
                "sweep.message_limit cannot exceed {}",
                MAX_MESSAGE_LIMIT
            )));
        }
        if self.sweep.interval_secs < 30 {
            return Err(TriageError::ConfigError(
                "sweep.interval_secs must be at least 30".to_string(),
            ));
        }

        if !(self.llm.api_base.starts_with("https://") || self.llm.api_base.starts_with("http://"))
        {
            return Err(TriageError::ConfigError(format!(
                "Invalid llm.api_base: '{}'. Must be an http(s) URL",
                self.llm.api_base
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "llm.model cannot be empty".to_string(),
            ));
        }
        if self.llm.api_key_env.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "llm.api_key_env cannot be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("llm.classify_temperature", self.llm.classify_temperature),
            ("llm.reply_temperature", self.llm.reply_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(TriageError::ConfigError(format!(
                    "{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }

        if self.reply.sign_off.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "reply.sign_off cannot be empty".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(TriageError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts > 10 {
            return Err(TriageError::ConfigError(
                "retry.max_attempts cannot exceed 10".to_string(),
            ));
        }

        if self.retry.base_delay_ms > MAX_RETRY_BASE_DELAY_MS {
            return Err(TriageError::ConfigError(format!(
                "retry.base_delay_ms cannot exceed {}",
                MAX_RETRY_BASE_DELAY_MS
            )));
        }

        if self.action_log.path.as_os_str().is_empty() {
            return Err(TriageError::ConfigError(
                "action_log.path cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
