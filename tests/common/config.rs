//! Test configuration helpers for loading .env credentials and creating test exporters

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use feishu_export::{Config, Exporter};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Live tenant settings read from the environment
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// User access token
    pub access_token: String,
    /// API base URL
    pub endpoint: String,
    /// Drive folder to export
    pub folder_token: Option<String>,
    /// Wiki space to export
    pub space_id: Option<String>,
}

/// Load Feishu credentials from environment variables
///
/// Required environment variables:
/// - `FEISHU_ACCESS_TOKEN` - User access token
///
/// Optional environment variables:
/// - `FEISHU_ENDPOINT` - API base URL (default: https://open.feishu.cn/open-apis)
/// - `FEISHU_FOLDER_TOKEN` - Drive folder exported by the folder test
/// - `FEISHU_SPACE_ID` - Wiki space exported by the wiki test
pub fn load_live_settings() -> Result<LiveSettings, ConfigError> {
    dotenvy::dotenv().ok();

    let access_token = std::env::var("FEISHU_ACCESS_TOKEN")
        .map_err(|_| ConfigError("FEISHU_ACCESS_TOKEN not set in environment".to_string()))?;

    let endpoint = std::env::var("FEISHU_ENDPOINT")
        .unwrap_or_else(|_| "https://open.feishu.cn/open-apis".to_string());

    Ok(LiveSettings {
        access_token,
        endpoint,
        folder_token: std::env::var("FEISHU_FOLDER_TOKEN").ok(),
        space_id: std::env::var("FEISHU_SPACE_ID").ok(),
    })
}

/// Check if live credentials are available
pub fn has_live_credentials() -> bool {
    load_live_settings().is_ok()
}

/// Configuration talking to `endpoint` with its database inside `dir`
///
/// Intervals are short so mocked export jobs finish quickly. Auto-resume is off;
/// tests that exercise it switch it on explicitly.
pub fn test_config(dir: &Path, endpoint: &str) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("export.db");
    config.provider.endpoint = endpoint.to_string();
    config.provider.access_token = Some("u-test-token".to_string());
    config.provider.request_timeout = Duration::from_secs(10);
    config.export.discovery_wait = Duration::from_millis(20);
    config.export.export_poll_interval = Duration::from_millis(10);
    config.export.export_max_polls = 20;
    config.export.auto_resume = false;
    config.export.shutdown_timeout = Duration::from_secs(10);
    config.discovery.list_retry.max_attempts = 2;
    config.discovery.list_retry.initial_delay = Duration::from_millis(10);
    config.discovery.list_retry.max_delay = Duration::from_millis(50);
    config.discovery.list_retry.jitter = false;
    config
}

/// Create an exporter talking to a mock API server
///
/// Returns the exporter and the temp directory holding its database and
/// output (which must be kept alive).
pub async fn create_mock_exporter(endpoint: &str) -> Result<(Exporter, TempDir), ConfigError> {
    let temp_dir =
        tempfile::tempdir().map_err(|e| ConfigError(format!("Failed to create temp dir: {}", e)))?;

    let exporter = Exporter::with_feishu(test_config(temp_dir.path(), endpoint))
        .await
        .map_err(|e| ConfigError(format!("Failed to create exporter: {}", e)))?;

    Ok((exporter, temp_dir))
}

/// Create an exporter against the live tenant configured in .env
pub async fn create_live_exporter() -> Result<(Exporter, LiveSettings, TempDir), ConfigError> {
    let settings = load_live_settings()?;
    let temp_dir =
        tempfile::tempdir().map_err(|e| ConfigError(format!("Failed to create temp dir: {}", e)))?;

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("export.db");
    config.provider.endpoint = settings.endpoint.clone();
    config.provider.access_token = Some(settings.access_token.clone());
    config.export.auto_resume = false;

    let exporter = Exporter::with_feishu(config)
        .await
        .map_err(|e| ConfigError(format!("Failed to create exporter: {}", e)))?;

    Ok((exporter, settings, temp_dir))
}
