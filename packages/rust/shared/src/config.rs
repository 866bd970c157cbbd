//! Application configuration for OpenKeywords.
//!
//! User config lives at `~/.openkeywords/openkeywords.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OpenKeywordsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "openkeywords.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".openkeywords";

// ---------------------------------------------------------------------------
// Config structs (matching openkeywords.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Retry policy for transient AI failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// SE Ranking metrics settings.
    #[serde(default)]
    pub seranking: SeRankingConfig,

    /// Job retention.
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of keywords a run aims to return.
    #[serde(default = "default_target_count")]
    pub target_count: usize,

    /// Minimum company-fit score a keyword needs to survive filtering.
    #[serde(default = "default_min_score")]
    pub min_score: u8,

    /// Minimum number of words per keyword.
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Desired number of clusters.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,

    /// Language used when the company file does not name one.
    #[serde(default = "default_language")]
    pub language: String,

    /// Region used when the company file does not name one.
    #[serde(default = "default_region")]
    pub region: String,

    /// Keywords per scoring call.
    #[serde(default = "default_scoring_batch_size")]
    pub scoring_batch_size: usize,

    /// Scoring batches in flight at once.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            min_score: default_min_score(),
            min_word_count: default_min_word_count(),
            cluster_count: default_cluster_count(),
            language: default_language(),
            region: default_region(),
            scoring_batch_size: default_scoring_batch_size(),
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

fn default_target_count() -> usize {
    50
}
fn default_min_score() -> u8 {
    40
}
fn default_min_word_count() -> usize {
    2
}
fn default_cluster_count() -> usize {
    6
}
fn default_language() -> String {
    "en".into()
}
fn default_region() -> String {
    "us".into()
}
fn default_scoring_batch_size() -> usize {
    50
}
fn default_max_concurrent_calls() -> usize {
    4
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Deadline for ordinary structured calls.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,

    /// Deadline for search-grounded calls, which are slower.
    #[serde(default = "default_grounded_timeout")]
    pub grounded_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            timeout_secs: default_gemini_timeout(),
            grounded_timeout_secs: default_grounded_timeout(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_gemini_timeout() -> u64 {
    120
}
fn default_grounded_timeout() -> u64 {
    180
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first, for timeouts and rate limits only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    1
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

/// `[seranking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeRankingConfig {
    #[serde(default = "default_seranking_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_seranking_base_url")]
    pub base_url: String,

    #[serde(default = "default_seranking_timeout")]
    pub timeout_secs: u64,
}

impl Default for SeRankingConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_seranking_key_env(),
            base_url: default_seranking_base_url(),
            timeout_secs: default_seranking_timeout(),
        }
    }
}

fn default_seranking_key_env() -> String {
    "SERANKING_API_KEY".into()
}
fn default_seranking_base_url() -> String {
    "https://api.seranking.com/v1".into()
}
fn default_seranking_timeout() -> u64 {
    30
}

/// `[jobs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Terminal jobs older than this are pruned.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Upper bound on retained terminal jobs.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            max_jobs: default_max_jobs(),
        }
    }
}

impl JobsConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3600)
    }
}

fn default_max_age_hours() -> u64 {
    24
}
fn default_max_jobs() -> usize {
    1000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.openkeywords/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OpenKeywordsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.openkeywords/openkeywords.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| OpenKeywordsError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        OpenKeywordsError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let d = &config.defaults;
    if d.min_score > 100 {
        return Err(OpenKeywordsError::validation(format!(
            "min_score must be within 0..=100, got {}",
            d.min_score
        )));
    }
    if d.target_count == 0 {
        return Err(OpenKeywordsError::validation("target_count must be positive"));
    }
    if d.scoring_batch_size == 0 || d.max_concurrent_calls == 0 {
        return Err(OpenKeywordsError::validation(
            "scoring_batch_size and max_concurrent_calls must be positive",
        ));
    }
    check_base_url("gemini.base_url", &config.gemini.base_url)?;
    check_base_url("seranking.base_url", &config.seranking.base_url)?;
    Ok(())
}

fn check_base_url(key: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| OpenKeywordsError::validation(format!("{key} '{value}' is not a URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(OpenKeywordsError::validation(format!(
            "{key} must be http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OpenKeywordsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OpenKeywordsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OpenKeywordsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the configured env var.
pub fn gemini_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(OpenKeywordsError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://aistudio.google.com/apikey"
        ))),
    }
}

/// Check that the Gemini API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    gemini_api_key(config).map(|_| ())
}

/// Read the SE Ranking API key, if one is configured.
pub fn seranking_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.seranking.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}
