//! Application configuration for Threadline.
//!
//! User config lives at `~/.threadline/threadline.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are referenced by environment-variable *name* only; the key
//! itself is never written to disk, and nothing reads the environment at
//! import time — components receive their config structs explicitly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadlineError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "threadline.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".threadline";

// ---------------------------------------------------------------------------
// Config structs (matching threadline.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chunking and accumulation defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// LLM backend settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Speech-recognition backend settings.
    #[serde(default)]
    pub asr: AsrConfig,

    /// Retry discipline for external calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Server bind settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Sliding-window chunk size in whitespace tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive windows, in tokens.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Initial/reset utterance threshold before consulting the segmenter.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hard ceiling on the threshold; reaching it forces a segment cut.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Pacing delay between successive graph pushes in batch mode (ms),
    /// so a consuming UI can render incrementally.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,

    /// Directory where conversation artifacts and the index database live.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            push_interval_ms: default_push_interval_ms(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_batch_size() -> usize {
    8
}
fn default_max_batch_size() -> usize {
    24
}
fn default_push_interval_ms() -> u64 {
    500
}
fn default_output_dir() -> String {
    "~/threadline-conversations".into()
}

/// `[anthropic]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the messages API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model id used for extraction and segmentation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for extraction calls.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Transport-level deadline per request, in seconds. A hanging call
    /// surfaces as a retryable network error instead of wedging the session.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            api_base: default_api_base(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_api_base() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-3-7-sonnet-20250219".into()
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// `[asr]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    /// Name of the env var holding the ASR API key.
    #[serde(default = "default_asr_api_key_env")]
    pub api_key_env: String,

    /// Realtime websocket endpoint of the speech backend.
    #[serde(default = "default_asr_url")]
    pub websocket_url: String,

    /// PCM sample rate the client streams at.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Bounded reconnection attempts after an unexpected upstream close.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_asr_api_key_env(),
            websocket_url: default_asr_url(),
            sample_rate: default_sample_rate(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

fn default_asr_api_key_env() -> String {
    "ASSEMBLYAI_API_KEY".into()
}
fn default_asr_url() -> String {
    "wss://api.assemblyai.com/v2/realtime/ws".into()
}
fn default_sample_rate() -> u32 {
    16_000
}
fn default_reconnect_attempts() -> u32 {
    3
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt budget per external call.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_base: default_backoff_base(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}
fn default_backoff_base() -> f64 {
    2.0
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.threadline/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ThreadlineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.threadline/threadline.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ThreadlineError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ThreadlineError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ThreadlineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ThreadlineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ThreadlineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that an API key env var is set and non-empty.
pub fn validate_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ThreadlineError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
