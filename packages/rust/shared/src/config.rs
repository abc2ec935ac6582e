//! Application configuration for DeepResearch.
//!
//! User config lives at `~/.deepresearch/deepresearch.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are only ever referenced by env var name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "deepresearch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".deepresearch";

// ---------------------------------------------------------------------------
// Config structs (matching deepresearch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Research loop defaults and output locations.
    #[serde(default)]
    pub research: ResearchDefaults,

    /// Search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Chat + embedding provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Page fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[research]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchDefaults {
    /// Number of depth iterations when `--depth` is not given.
    #[serde(default = "default_depth")]
    pub default_depth: u32,

    /// How many frontier queries run per depth.
    #[serde(default = "default_select_limit")]
    pub select_limit: usize,

    /// Rank follow-up queries by novelty before enqueueing them.
    #[serde(default = "default_true")]
    pub ranking: bool,

    /// Fetch full page text for each hit before condensing.
    #[serde(default)]
    pub fetch_pages: bool,

    /// Knowledge database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Text report written at the end of a run.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// JSON id → synopsis export written at the end of a run.
    #[serde(default = "default_export_path")]
    pub export_path: String,

    /// JSON output of the clustering post-process.
    #[serde(default = "default_clusters_path")]
    pub clusters_path: String,

    /// Number of topic groups for clustering.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,
}

impl Default for ResearchDefaults {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            select_limit: default_select_limit(),
            ranking: true,
            fetch_pages: false,
            db_path: default_db_path(),
            report_path: default_report_path(),
            export_path: default_export_path(),
            clusters_path: default_clusters_path(),
            cluster_count: default_cluster_count(),
        }
    }
}

fn default_depth() -> u32 {
    2
}
fn default_select_limit() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_db_path() -> String {
    "knowledge.db".into()
}
fn default_report_path() -> String {
    "report.md".into()
}
fn default_export_path() -> String {
    "knowledge.json".into()
}
fn default_clusters_path() -> String {
    "clusters.json".into()
}
fn default_cluster_count() -> usize {
    3
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the SerpAPI key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// SerpAPI engine name.
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Results requested per query.
    #[serde(default = "default_num_results")]
    pub num_results: u32,

    /// Interface language (`hl`).
    #[serde(default = "default_language")]
    pub language: String,

    /// Minimum ms between two search calls.
    #[serde(default = "default_interval")]
    pub min_interval_ms: u64,

    /// Request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
            engine: default_engine(),
            num_results: default_num_results(),
            language: default_language(),
            min_interval_ms: default_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "SERPAPI_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://serpapi.com/search.json".into()
}
fn default_engine() -> String {
    "google".into()
}
fn default_num_results() -> u32 {
    5
}
fn default_language() -> String {
    "en".into()
}
fn default_interval() -> u64 {
    1000
}
fn default_timeout() -> u64 {
    30
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// API base URL (any OpenAI-compatible endpoint).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for condensation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Declared embedding dimensionality (also the zero-vector length).
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Sampling temperature for condensation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per synopsis.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Minimum ms between two chat calls.
    #[serde(default = "default_interval")]
    pub min_interval_ms: u64,

    /// Request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            min_interval_ms: default_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_embedding_dimensions() -> usize {
    1536
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    100
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Fetched text is truncated to this many characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    20
}
fn default_max_chars() -> usize {
    12_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.deepresearch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ResearchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.deepresearch/deepresearch.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ResearchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ResearchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ResearchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ResearchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ResearchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a non-empty secret from the named env var.
pub fn read_api_key(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Check that the search API key env var is set and non-empty.
///
/// Without it every search degrades to zero results, so a run could only
/// ever produce an empty report.
pub fn validate_search_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.search.api_key_env;
    match read_api_key(var_name) {
        Some(_) => Ok(()),
        None => Err(ResearchError::config(format!(
            "search API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://serpapi.com/manage-api-key"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("SERPAPI_API_KEY"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.research.default_depth, 2);
        assert_eq!(parsed.research.select_limit, 5);
        assert_eq!(parsed.openai.embedding_dimensions, 1536);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[research]
default_depth = 4
ranking = false

[search]
num_results = 10
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.research.default_depth, 4);
        assert!(!config.research.ranking);
        assert_eq!(config.research.report_path, "report.md");
        assert_eq!(config.search.num_results, 10);
        assert_eq!(config.search.engine, "google");
        assert_eq!(config.openai.chat_model, "gpt-3.5-turbo");
        assert_eq!(config.fetch.max_chars, 12_000);
    }

    #[test]
    fn search_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.search.api_key_env = "DR_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_search_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("search API key not found"));
    }

    #[test]
    fn load_config_from_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("dr_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[research\ndefault_depth = ").expect("write");
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ResearchError::Config { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
