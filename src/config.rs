//! Configuration types for feishu-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Orchestration behaviour (batching, polling, resume, shutdown)
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum number of pending leaves fetched per scheduler batch (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Scheduler sleep while discovery still has containers to expand (default: 1000ms)
    #[serde(default = "default_discovery_wait", with = "millis_serde")]
    pub discovery_wait: Duration,

    /// Interval between export job status polls (default: 2000ms)
    #[serde(default = "default_export_poll_interval", with = "millis_serde")]
    pub export_poll_interval: Duration,

    /// Maximum number of export job polls before giving up (default: 150, about 5 minutes)
    #[serde(default = "default_export_max_polls")]
    pub export_max_polls: u32,

    /// Resume interrupted tasks when the exporter is created (default: true)
    #[serde(default = "default_true")]
    pub auto_resume: bool,

    /// How long shutdown waits for running tasks to stop (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// First back-off delay after a task store failure inside a loop (default: 500ms)
    #[serde(default = "default_store_retry_delay", with = "millis_serde")]
    pub store_retry_delay: Duration,

    /// Upper bound for the task store back-off delay (default: 30 seconds)
    #[serde(default = "default_store_retry_max_delay", with = "duration_serde")]
    pub store_retry_max_delay: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            discovery_wait: default_discovery_wait(),
            export_poll_interval: default_export_poll_interval(),
            export_max_polls: default_export_max_polls(),
            auto_resume: true,
            shutdown_timeout: default_shutdown_timeout(),
            store_retry_delay: default_store_retry_delay(),
            store_retry_max_delay: default_store_retry_max_delay(),
        }
    }
}

/// Tree discovery behaviour
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Number of sibling containers listed concurrently (default: 4)
    #[serde(default = "default_discovery_concurrency")]
    pub discovery_concurrency: usize,

    /// Retry policy for container listings
    #[serde(default = "default_list_retry")]
    pub list_retry: RetryConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_concurrency: default_discovery_concurrency(),
            list_retry: default_list_retry(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./feishu-export.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Feishu open API client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL (default: "https://open.feishu.cn/open-apis")
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// User access token; acquiring and refreshing it is up to the embedding application
    #[serde(default)]
    pub access_token: Option<String>,

    /// Timeout applied to every HTTP request (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Page size for drive folder listings (default: 200, the API maximum)
    #[serde(default = "default_drive_page_size")]
    pub drive_page_size: u32,

    /// Page size for wiki space listings (default: 20)
    #[serde(default = "default_wiki_space_page_size")]
    pub wiki_space_page_size: u32,

    /// Page size for wiki node listings (default: 50)
    #[serde(default = "default_wiki_node_page_size")]
    pub wiki_node_page_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_token: None,
            request_timeout: default_request_timeout(),
            drive_page_size: default_drive_page_size(),
            wiki_space_page_size: default_wiki_space_page_size(),
            wiki_node_page_size: default_wiki_node_page_size(),
        }
    }
}

/// Main configuration for the exporter
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestration settings (batching, polling, resume, shutdown)
    #[serde(flatten)]
    pub export: ExportConfig,

    /// Tree discovery settings
    #[serde(flatten)]
    pub discovery: DiscoveryConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Feishu API client
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Config {
    /// Check values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.export.batch_size == 0 {
            return Err(config_error("batch_size must be at least 1", "batch_size"));
        }
        if self.export.export_max_polls == 0 {
            return Err(config_error(
                "export_max_polls must be at least 1",
                "export_max_polls",
            ));
        }
        if self.discovery.discovery_concurrency == 0 {
            return Err(config_error(
                "discovery_concurrency must be at least 1",
                "discovery_concurrency",
            ));
        }
        if let Err(e) = url::Url::parse(&self.provider.endpoint) {
            return Err(config_error(
                &format!("invalid endpoint '{}': {}", self.provider.endpoint, e),
                "provider.endpoint",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_batch_size() -> usize {
    5
}

fn default_discovery_wait() -> Duration {
    Duration::from_millis(1000)
}

fn default_export_poll_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_export_max_polls() -> u32 {
    150
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_store_retry_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_store_retry_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_discovery_concurrency() -> usize {
    4
}

fn default_list_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./feishu-export.db")
}

fn default_endpoint() -> String {
    "https://open.feishu.cn/open-apis".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_drive_page_size() -> u32 {
    200
}

fn default_wiki_space_page_size() -> u32 {
    20
}

fn default_wiki_node_page_size() -> u32 {
    50
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper for sub-second intervals
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
