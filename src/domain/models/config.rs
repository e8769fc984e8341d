use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::adapter::AdapterKind;

/// Main configuration structure for almsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP transport settings shared by every backend
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-backend settings
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Where adapter credentials are read from
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation policy for file output (daily, hourly, never)
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts per remote call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Verify TLS certificates unless a backend overrides it
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            verify_ssl: true,
        }
    }
}

/// Settings for every supported backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendsConfig {
    /// Jira
    #[serde(default)]
    pub jira: BackendSettings,

    /// Azure DevOps
    #[serde(default)]
    pub azure_devops: BackendSettings,

    /// Polarion
    #[serde(default)]
    pub polarion: BackendSettings,
}

impl BackendsConfig {
    /// Settings for one backend.
    pub fn get(&self, kind: AdapterKind) -> &BackendSettings {
        match kind {
            AdapterKind::Jira => &self.jira,
            AdapterKind::AzureDevOps => &self.azure_devops,
            AdapterKind::Polarion => &self.polarion,
        }
    }

    /// Backends whose missing credentials must abort startup.
    pub fn required(&self) -> Vec<AdapterKind> {
        AdapterKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).required)
            .collect()
    }
}

/// Settings for one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendSettings {
    /// Whether the registry should try to bring this backend up
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fail startup when no credentials exist for this backend
    #[serde(default)]
    pub required: bool,

    /// Name of the secret holding the connection parameters; defaults to
    /// the backend identifier
    #[serde(default)]
    pub secret: Option<String>,

    /// Remote API version override
    #[serde(default)]
    pub api_version: Option<String>,

    /// Result-page cap override
    #[serde(default)]
    pub max_results: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            secret: None,
            api_version: None,
            max_results: None,
        }
    }
}

impl BackendSettings {
    /// Secret name for `kind`.
    pub fn secret_name(&self, kind: AdapterKind) -> String {
        self.secret
            .clone()
            .unwrap_or_else(|| kind.as_str().to_string())
    }
}

/// Secret source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SecretsConfig {
    /// Directory with `<name>.json` secret files; environment variables
    /// are used when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.backends.jira.enabled);
        assert!(config.backends.required().is_empty());
    }

    #[test]
    fn test_secret_name_defaults_to_identifier() {
        let settings = BackendSettings::default();
        assert_eq!(settings.secret_name(AdapterKind::AzureDevOps), "azure_devops");
        let named = BackendSettings {
            secret: Some("ado-prod".into()),
            ..BackendSettings::default()
        };
        assert_eq!(named.secret_name(AdapterKind::AzureDevOps), "ado-prod");
    }

    #[test]
    fn test_partial_yaml() {
        let config: Config = serde_yaml::from_str(
            "backends:\n  polarion:\n    required: true\n    max_results: 50\n",
        )
        .unwrap();
        assert_eq!(config.backends.required(), vec![AdapterKind::Polarion]);
        assert_eq!(config.backends.polarion.max_results, Some(50));
        assert!(config.backends.jira.enabled);
    }
}
