use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the destination store's bearer token.
pub const TOKEN_ENV: &str = "DESTINATION_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Root of the WordPress REST API, e.g. `https://blog.example.com/wp-json/wp/v2`.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Stop after this many pages. `0` walks until the source runs dry.
    #[serde(default)]
    pub max_pages: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: default_user_agent(),
            per_page: default_per_page(),
            max_pages: 0,
            page_delay_ms: default_page_delay_ms(),
            timeout_secs: default_source_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; press-sync/0.3; +https://github.com/press-sync)".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_page_delay_ms() -> u64 {
    250
}
fn default_source_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Overrides `https://<project_id>.api.sanity.io`. Mostly useful for tests
    /// and self-hosted gateways.
    #[serde(default)]
    pub api_host: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles per attempt, capped at 32x.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_destination_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: default_dataset(),
            api_version: default_api_version(),
            api_host: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_destination_timeout_secs(),
            token: None,
        }
    }
}

impl DestinationConfig {
    /// Base URL for the versioned HTTP API, without a trailing slash.
    pub fn api_base(&self) -> String {
        let host = match &self.api_host {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => format!("https://{}.api.sanity.io", self.project_id),
        };
        format!("{}/v{}", host, self.api_version.trim_start_matches('v'))
    }
}

fn default_dataset() -> String {
    "production".to_string()
}
fn default_api_version() -> String {
    "2024-01-01".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_destination_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Flat `{ "<author id>": "<name>" }` JSON file written by `press-sync author-cache`.
    #[serde(default = "default_author_map")]
    pub author_map: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            author_map: default_author_map(),
        }
    }
}

fn default_author_map() -> PathBuf {
    PathBuf::from("./data/author-names.json")
}

/// Load the configuration file, apply environment overrides, and validate.
///
/// A missing file is not an error: every setting can come from the
/// environment (`SOURCE_BASE_URL`, `DESTINATION_PROJECT_ID`,
/// `DESTINATION_DATASET`, `DESTINATION_TOKEN`).
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Overlay environment values onto a parsed config.
///
/// `lookup` is injected so tests do not have to mutate the process
/// environment.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty("SOURCE_BASE_URL") {
        config.source.base_url = url;
    }
    if let Some(project) = non_empty("DESTINATION_PROJECT_ID") {
        config.destination.project_id = project;
    }
    if let Some(dataset) = non_empty("DESTINATION_DATASET") {
        config.destination.dataset = dataset;
    }
    if let Some(token) = non_empty(TOKEN_ENV) {
        config.destination.token = Some(token);
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.source.base_url.trim().is_empty() {
        bail!("source.base_url must be set (or SOURCE_BASE_URL)");
    }
    if !(1..=100).contains(&config.source.per_page) {
        bail!("source.per_page must be in [1, 100]");
    }
    if config.source.timeout_secs == 0 || config.destination.timeout_secs == 0 {
        bail!("timeout_secs must be > 0");
    }
    if config.destination.project_id.trim().is_empty() && config.destination.api_host.is_none() {
        bail!("destination.project_id must be set (or DESTINATION_PROJECT_ID)");
    }
    if config.destination.dataset.trim().is_empty() {
        bail!("destination.dataset must not be empty");
    }
    Ok(())
}
