//! Configuration loading
//!
//! Resolution order for every setting:
//! 1. Environment variable (highest priority)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing config file is not an error: defaults are used and a warning is
//! logged. Values are validated once, after all layers are applied.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "OPENBOOK_CONFIG";

const DEFAULT_GENRES: &[&str] = &[
    "fiction",
    "fantasy",
    "science_fiction",
    "mystery",
    "romance",
    "history",
];

/// Settings consumed by the catalog synchronization subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Base URL of the subject-search API (no trailing path)
    pub api_base_url: String,
    /// Cover image URL template; `{id}` is replaced by the record's cover id
    pub cover_url_template: String,
    /// Genres to synchronize, in order
    pub genres: Vec<String>,
    /// Target number of saved records per genre
    pub quota_per_genre: usize,
    /// Records requested per page
    pub page_size: usize,
    /// Number of genres synchronized concurrently
    pub group_size: usize,
    /// Per-request timeout for the external API
    pub request_timeout_ms: u64,
    /// Automatic retries for transient network faults
    pub max_retries: u32,
    /// Base delay for exponential retry backoff
    pub retry_base_delay_ms: u64,
    /// Courtesy delay after a page that saved records
    pub page_delay_ms: u64,
    /// Delay after an empty page before asking again
    pub empty_page_delay_ms: u64,
    /// Delay after a page-level error before retrying the same offset
    pub error_backoff_ms: u64,
    /// Delay between concurrency groups
    pub group_delay_ms: u64,
    /// Write throttle: pause `write_pause_ms` for every `write_pause_every` saves
    pub write_pause_ms: u64,
    pub write_pause_every: usize,
    /// Consecutive page-level errors before a genre is marked failed
    pub max_consecutive_errors: u32,
    /// Consecutive empty pages before a genre is considered exhausted
    pub max_consecutive_empty_pages: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://openlibrary.org".to_string(),
            cover_url_template: "https://covers.openlibrary.org/b/id/{id}-L.jpg".to_string(),
            genres: DEFAULT_GENRES.iter().map(|g| g.to_string()).collect(),
            quota_per_genre: 100,
            page_size: 20,
            group_size: 2,
            request_timeout_ms: 60_000,
            max_retries: 3,
            retry_base_delay_ms: 100,
            page_delay_ms: 1000,
            empty_page_delay_ms: 1000,
            error_backoff_ms: 3000,
            group_delay_ms: 3000,
            write_pause_ms: 200,
            write_pause_every: 5,
            max_consecutive_errors: 3,
            max_consecutive_empty_pages: 3,
        }
    }
}

impl SyncSettings {
    /// Settings with every pacing delay set to zero (tests, one-off runs)
    pub fn without_delays(mut self) -> Self {
        self.retry_base_delay_ms = 0;
        self.page_delay_ms = 0;
        self.empty_page_delay_ms = 0;
        self.error_backoff_ms = 0;
        self.group_delay_ms = 0;
        self.write_pause_ms = 0;
        self
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_string("BOOKS_API_URL") {
            self.api_base_url = url;
        }
        if let Some(template) = env_string("COVER_URL_TEMPLATE") {
            self.cover_url_template = template;
        }
        if let Some(genres) = env_string("GENRES") {
            self.genres = parse_genre_list(&genres);
        }
        if let Some(quota) = env_parse("SYNC_QUOTA_PER_GENRE")? {
            self.quota_per_genre = quota;
        }
        if let Some(page_size) = env_parse("SYNC_PAGE_SIZE")? {
            self.page_size = page_size;
        }
        if let Some(group_size) = env_parse("SYNC_GROUP_SIZE")? {
            self.group_size = group_size;
        }
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.genres.is_empty() {
            return Err(Error::Config("genre list is empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.quota_per_genre == 0 {
            return Err(Error::Config("quota_per_genre must be at least 1".to_string()));
        }
        if self.group_size == 0 {
            return Err(Error::Config("group_size must be at least 1".to_string()));
        }
        if self.write_pause_every == 0 {
            return Err(Error::Config("write_pause_every must be at least 1".to_string()));
        }
        if self.max_consecutive_errors == 0 || self.max_consecutive_empty_pages == 0 {
            return Err(Error::Config(
                "consecutive error/empty-page thresholds must be at least 1".to_string(),
            ));
        }
        reqwest::Url::parse(&self.api_base_url).map_err(|e| {
            Error::Config(format!("invalid api_base_url '{}': {}", self.api_base_url, e))
        })?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn empty_page_delay(&self) -> Duration {
        Duration::from_millis(self.empty_page_delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }

    pub fn write_pause(&self) -> Duration {
        Duration::from_millis(self.write_pause_ms)
    }
}

/// Full service configuration (TOML root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// HTTP listen address
    pub listen_addr: String,
    /// Connection pool capacity; must be at least `sync.group_size`
    pub max_connections: u32,
    /// Run a full synchronization at startup when the catalog is empty
    pub sync_on_startup: bool,
    pub sync: SyncSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            listen_addr: "127.0.0.1:5730".to_string(),
            max_connections: 10,
            sync_on_startup: true,
            sync: SyncSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration: TOML file (if any), then environment, then validate.
    ///
    /// `explicit_path` comes from the command line; when absent the
    /// `OPENBOOK_CONFIG` variable and then the per-user config directory are
    /// consulted.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| env_string(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml_file(&path)?
            }
            Some(path) => {
                if explicit_path.is_some() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("No config directory available, using defaults");
                Self::default()
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_string("OPENBOOK_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(addr) = env_string("OPENBOOK_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(max) = env_parse("OPENBOOK_MAX_CONNECTIONS")? {
            self.max_connections = max;
        }
        if let Some(flag) = env_parse("OPENBOOK_SYNC_ON_STARTUP")? {
            self.sync_on_startup = flag;
        }
        self.sync.apply_env()
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        // Each concurrently running genre holds one connection for its page transaction
        if (self.max_connections as usize) < self.sync.group_size {
            return Err(Error::Config(format!(
                "max_connections ({}) must be at least sync.group_size ({})",
                self.max_connections, self.sync.group_size
            )));
        }
        Ok(())
    }
}

/// Split a comma-separated genre list, trimming whitespace and dropping empties
pub fn parse_genre_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("openbook").join("openbook-sync.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("openbook").join("openbook.db"))
        .unwrap_or_else(|| PathBuf::from("./openbook_data/openbook.db"))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", name, raw, e))),
        None => Ok(None),
    }
}
