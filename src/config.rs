use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ReplayError, ReplayResult};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub player: PlayerConfig,
    /// Vision decision engine. Absent means `ai_decision` clicks fall back to
    /// the recorded position.
    #[serde(default)]
    pub decision: Option<DecisionConfig>,
    /// Vision model used as the text recogniser. Absent disables the text
    /// strategy and text waits.
    #[serde(default)]
    pub ocr: Option<OcrConfig>,
}

/// Timing, retry and matching knobs for a playback run.
/// All durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_step_delay")]
    pub step_delay: u64,
    #[serde(default = "default_click_delay")]
    pub click_delay: u64,
    #[serde(default = "default_type_delay")]
    pub type_delay: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Half the side of the square searched around a hint position, in pixels.
    #[serde(default = "default_search_region_expand")]
    pub search_region_expand: u32,
    /// Minimum template similarity in [0, 1] accepted as a match.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout: u64,
}

impl PlayerConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout)
    }

    /// Zero delays everywhere; handy for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            step_delay: 0,
            click_delay: 0,
            type_delay: 0,
            retry_delay: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ReplayResult<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ReplayError::Config(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.search_region_expand == 0 {
            return Err(ReplayError::Config(
                "search_region_expand must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            step_delay: default_step_delay(),
            click_delay: default_click_delay(),
            type_delay: default_type_delay(),
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            search_region_expand: default_search_region_expand(),
            match_threshold: default_match_threshold(),
            ocr_timeout: default_ocr_timeout(),
        }
    }
}

fn default_step_delay() -> u64 {
    500
}

fn default_click_delay() -> u64 {
    100
}

fn default_type_delay() -> u64 {
    50
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_search_region_expand() -> u32 {
    200
}

fn default_match_threshold() -> f32 {
    0.8
}

fn default_ocr_timeout() -> u64 {
    5000
}

/// OpenAI-compatible vision endpoint used for `ai_decision` clicks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Full chat-completions URL.
    pub api_base: String,
    pub model: String,
    /// Falls back to the `SEECLAW_DECISION_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DecisionConfig {
    pub fn resolve_api_key(&self) -> String {
        resolve_key(self.api_key.as_deref(), DECISION_KEY_VAR)
    }
}

const DECISION_KEY_VAR: &str = "SEECLAW_DECISION_API_KEY";
const OCR_KEY_VAR: &str = "SEECLAW_OCR_API_KEY";

/// A non-empty key from the config file wins; the environment is the fallback.
fn resolve_key(configured: Option<&str>, var: &str) -> String {
    configured
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(var).ok())
        .unwrap_or_default()
}

fn default_temperature() -> f64 {
    0.3
}

/// OpenAI-compatible vision endpoint used as the OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Full chat-completions URL.
    pub api_base: String,
    pub model: String,
    /// Falls back to the `SEECLAW_OCR_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ocr_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OcrConfig {
    pub fn resolve_api_key(&self) -> String {
        resolve_key(self.api_key.as_deref(), OCR_KEY_VAR)
    }
}

fn default_ocr_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    30
}

fn resolve_config_path() -> ReplayResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("seeclaw-replay").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config directory");
            return Ok(candidate);
        }
    }

    Err(ReplayError::Config(
        "config.toml not found next to executable, in working directory or user config directory"
            .into(),
    ))
}

/// Load the config from the first standard location that has one.
pub fn load_config() -> ReplayResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> ReplayResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.player.validate()?;
    tracing::info!(
        path = %path.display(),
        decision = config.decision.is_some(),
        ocr = config.ocr.is_some(),
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> ReplayResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
