use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Persisted document bodies are truncated to this many characters;
    /// round-trip fidelity is not guaranteed for very large documents.
    #[serde(default = "default_max_stored_chars")]
    pub max_stored_chars: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_stored_chars: default_max_stored_chars(),
        }
    }
}

fn default_max_bytes() -> u64 {
    16 * 1024 * 1024
}
fn default_max_stored_chars() -> usize {
    50_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vision_model: Option<String>,
    /// Credential pool for round-robin rotation across outbound calls.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: None,
            vision_model: None,
            api_keys: Vec::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Most recent entries retained per conversation.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Entries replayed as prior context on each question; kept smaller
    /// than the cap so a cushion of history stays server-side.
    #[serde(default = "default_replay_window")]
    pub replay_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            replay_window: default_replay_window(),
        }
    }
}

fn default_history_cap() -> usize {
    20
}
fn default_replay_window() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VideoConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_video_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_video_max_results")]
    pub max_results: u32,
}

fn default_video_endpoint() -> String {
    "https://www.googleapis.com/youtube/v3/search".to_string()
}
fn default_video_max_results() -> u32 {
    2
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Retry policy shared by every outbound call this config governs.
    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(
            self.max_attempts,
            std::time::Duration::from_millis(self.retry_base_ms),
        )
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate upload limits
    if config.upload.max_bytes == 0 {
        anyhow::bail!("upload.max_bytes must be > 0");
    }
    if config.upload.max_stored_chars == 0 {
        anyhow::bail!("upload.max_stored_chars must be > 0");
    }

    // Validate inference: an enabled provider with no credentials is a
    // startup configuration error, not something to discover at call time.
    if config.inference.is_enabled() {
        if config.inference.api_keys.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!(
                "inference.api_keys must be non-empty when provider is '{}'",
                config.inference.provider
            );
        }
        if config.inference.model.is_none() {
            anyhow::bail!(
                "inference.model must be specified when provider is '{}'",
                config.inference.provider
            );
        }
    }
    if config.inference.max_attempts == 0 {
        anyhow::bail!("inference.max_attempts must be >= 1");
    }

    match config.inference.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown inference provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate chat window
    if config.chat.history_cap == 0 {
        anyhow::bail!("chat.history_cap must be >= 1");
    }
    if config.chat.replay_window == 0 || config.chat.replay_window > config.chat.history_cap {
        anyhow::bail!(
            "chat.replay_window must be in 1..={}",
            config.chat.history_cap
        );
    }

    Ok(config)
}
