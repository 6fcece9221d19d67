//! Configuration – reads/writes `~/.harmony/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harmony_hal::{ActuatorConfig, KindPolicy};
use harmony_perception::PerceptionConfig;
use harmony_runtime::OrchestratorConfig;
use harmony_types::HarmonyError;
use serde::{Deserialize, Serialize};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// The actuator controller link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSection {
    /// Controller base URL.  A bare `host:port` is accepted.
    pub base_url: String,
    pub probe_path: String,
    pub probe_timeout_ms: u64,
    pub head_interval_ms: u64,
    pub head_timeout_ms: u64,
    pub emotion_interval_ms: u64,
    pub emotion_timeout_ms: u64,
    pub reset_interval_ms: u64,
    pub reset_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub emotion_attempts: u32,
    pub reset_attempts: u32,
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1".to_string(),
            probe_path: "/health".to_string(),
            probe_timeout_ms: 3_000,
            head_interval_ms: 1_000,
            head_timeout_ms: 1_500,
            emotion_interval_ms: 100,
            emotion_timeout_ms: 5_000,
            reset_interval_ms: 100,
            reset_timeout_ms: 5_000,
            retry_delay_ms: 1_000,
            emotion_attempts: 3,
            reset_attempts: 2,
        }
    }
}

impl ActuatorSection {
    pub fn client_config(&self) -> ActuatorConfig {
        ActuatorConfig {
            emotion: KindPolicy {
                min_interval: ms(self.emotion_interval_ms),
                timeout: ms(self.emotion_timeout_ms),
            },
            head: KindPolicy {
                min_interval: ms(self.head_interval_ms),
                timeout: ms(self.head_timeout_ms),
            },
            reset: KindPolicy {
                min_interval: ms(self.reset_interval_ms),
                timeout: ms(self.reset_timeout_ms),
            },
            retry_delay: ms(self.retry_delay_ms),
            probe_path: self.probe_path.clone(),
            probe_timeout: ms(self.probe_timeout_ms),
        }
    }
}

/// Camera and head tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionSection {
    pub capture_interval_ms: u64,
    pub interval_ms: u64,
    pub miss_threshold: u32,
    pub miss_backoff_ms: u64,
    pub confidence_threshold: f32,
    pub max_frame_age_ms: u64,
    pub startup_delay_ms: u64,
    /// Skip head updates whose count did not change.
    pub suppress_unchanged: bool,
}

impl Default for PerceptionSection {
    fn default() -> Self {
        Self {
            capture_interval_ms: 33,
            interval_ms: 1_000,
            miss_threshold: 5,
            miss_backoff_ms: 5_000,
            confidence_threshold: 0.6,
            max_frame_age_ms: 2_000,
            startup_delay_ms: 2_000,
            suppress_unchanged: false,
        }
    }
}

impl PerceptionSection {
    pub fn loop_config(&self) -> PerceptionConfig {
        PerceptionConfig {
            interval: ms(self.interval_ms),
            miss_threshold: self.miss_threshold,
            miss_backoff: ms(self.miss_backoff_ms),
            confidence_threshold: self.confidence_threshold,
            max_frame_age: ms(self.max_frame_age_ms),
            startup_delay: ms(self.startup_delay_ms),
            ..PerceptionConfig::default()
        }
    }
}

/// Conversational turn delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub pause_settle_ms: u64,
    pub reset_settle_ms: u64,
    pub idle_gap_ms: u64,
    pub empty_capture_delay_ms: u64,
    pub error_delay_ms: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            pause_settle_ms: 500,
            reset_settle_ms: 2_000,
            idle_gap_ms: 500,
            empty_capture_delay_ms: 1_000,
            error_delay_ms: 2_000,
        }
    }
}

impl OrchestratorSection {
    pub fn orchestrator_config(&self, actuator: &ActuatorSection) -> OrchestratorConfig {
        OrchestratorConfig {
            pause_settle: ms(self.pause_settle_ms),
            reset_settle: ms(self.reset_settle_ms),
            idle_gap: ms(self.idle_gap_ms),
            empty_capture_delay: ms(self.empty_capture_delay_ms),
            error_delay: ms(self.error_delay_ms),
            emotion_attempts: actuator.emotion_attempts,
            emotion_timeout: ms(actuator.emotion_timeout_ms),
            reset_attempts: actuator.reset_attempts,
            reset_timeout: ms(actuator.reset_timeout_ms),
        }
    }
}

/// Zero-shot sentiment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentSection {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for SentimentSection {
    fn default() -> Self {
        Self {
            url: "https://api-inference.huggingface.co/models/facebook/bart-large-mnli".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Vision chat endpoint that writes the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSection {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for ResponseSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            model: "llava".to_string(),
            max_tokens: 600,
            temperature: 0.7,
            timeout_ms: 15_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted configuration stored in `~/.harmony/config.toml`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub actuator: ActuatorSection,
    #[serde(default)]
    pub perception: PerceptionSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub sentiment: SentimentSection,
    #[serde(default)]
    pub response: ResponseSection,
    /// Bearer token for the inference endpoints (stored as plain text; the
    /// file is written owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_token: String,
}

impl Config {
    pub fn api_token(&self) -> Option<String> {
        (!self.api_token.is_empty()).then(|| self.api_token.clone())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("actuator", &self.actuator)
            .field("perception", &self.perception)
            .field("orchestrator", &self.orchestrator)
            .field("sentiment", &self.sentiment)
            .field("response", &self.response)
            .field(
                "api_token",
                if self.api_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

/// Return the path to `~/.harmony/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".harmony").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, HarmonyError> {
    Ok(load_from(&config_path())?.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, HarmonyError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        HarmonyError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| HarmonyError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ESP32_URL`, then `HARMONY_ACTUATOR_URL` | `actuator.base_url` |
/// | `HARMONY_HEAD_INTERVAL_MS` | `actuator.head_interval_ms` |
/// | `HARMONY_CONFIDENCE_THRESHOLD` | `perception.confidence_threshold` |
/// | `HARMONY_SUPPRESS_UNCHANGED` | `perception.suppress_unchanged` |
/// | `HARMONY_SENTIMENT_URL` | `sentiment.url` |
/// | `HARMONY_RESPONSE_URL` | `response.base_url` |
/// | `HARMONY_MODEL` | `response.model` |
/// | `HUGGINGFACEHUB_API_TOKEN`, then `HARMONY_API_TOKEN` | `api_token` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ESP32_URL") {
        cfg.actuator.base_url = v;
    }
    if let Ok(v) = std::env::var("HARMONY_ACTUATOR_URL") {
        cfg.actuator.base_url = v;
    }
    if let Ok(v) = std::env::var("HARMONY_HEAD_INTERVAL_MS")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.actuator.head_interval_ms = n;
    }
    if let Ok(v) = std::env::var("HARMONY_CONFIDENCE_THRESHOLD")
        && let Ok(t) = v.parse::<f32>()
        && (0.0..=1.0).contains(&t)
    {
        cfg.perception.confidence_threshold = t;
    }
    if let Ok(v) = std::env::var("HARMONY_SUPPRESS_UNCHANGED")
        && let Ok(b) = v.parse::<bool>()
    {
        cfg.perception.suppress_unchanged = b;
    }
    if let Ok(v) = std::env::var("HARMONY_SENTIMENT_URL") {
        cfg.sentiment.url = v;
    }
    if let Ok(v) = std::env::var("HARMONY_RESPONSE_URL") {
        cfg.response.base_url = v;
    }
    if let Ok(v) = std::env::var("HARMONY_MODEL") {
        cfg.response.model = v;
    }
    if let Ok(v) = std::env::var("HUGGINGFACEHUB_API_TOKEN") {
        cfg.api_token = v;
    }
    if let Ok(v) = std::env::var("HARMONY_API_TOKEN") {
        cfg.api_token = v;
    }
}

/// Save the config to disk, creating `~/.harmony/` if necessary.
pub fn save(cfg: &Config) -> Result<(), HarmonyError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), HarmonyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| HarmonyError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                HarmonyError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| HarmonyError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| HarmonyError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
