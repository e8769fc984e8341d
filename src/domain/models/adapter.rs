//! Adapter domain models.
//!
//! Adapters connect the internal work-item catalog to an external ALM
//! backend. Each backend kind has exactly one adapter implementation; the
//! registry holds at most one configured instance per kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::{AlmError, AlmResult};

/// Key fragments that mark a configuration value as secret.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["password", "token", "secret", "key", "auth"];

/// Placeholder written in place of secret values.
pub const REDACTED: &str = "***REDACTED***";

/// The ALM backends this crate can talk to.
///
/// Each variant corresponds to one wire protocol: Jira is plain REST/JSON,
/// Azure DevOps is REST with JSON-Patch mutations, Polarion is SOAP/XML
/// with a login session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Jira (REST/JSON).
    Jira,
    /// Azure DevOps Boards (REST/JSON-Patch).
    AzureDevOps,
    /// Polarion ALM (SOAP/XML).
    Polarion,
}

impl AdapterKind {
    /// All known backend kinds, in dispatch order.
    pub const ALL: [Self; 3] = [Self::Jira, Self::AzureDevOps, Self::Polarion];

    /// Returns the backend identifier used for dispatch.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::AzureDevOps => "azure_devops",
            Self::Polarion => "polarion",
        }
    }

    /// Parse a backend identifier.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "jira" => Some(Self::Jira),
            "azure_devops" | "azure-devops" | "ado" => Some(Self::AzureDevOps),
            "polarion" => Some(Self::Polarion),
            _ => None,
        }
    }

    /// Human-readable adapter name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Jira => "Jira Adapter",
            Self::AzureDevOps => "Azure DevOps Adapter",
            Self::Polarion => "Polarion Adapter",
        }
    }

    /// Backend field receiving a record's title on every write.
    pub fn title_field(&self) -> &'static str {
        match self {
            Self::Jira => "summary",
            Self::AzureDevOps => "System.Title",
            Self::Polarion => "title",
        }
    }

    /// Backend field receiving a record's text on every write.
    pub fn description_field(&self) -> &'static str {
        match self {
            Self::Jira => "description",
            Self::AzureDevOps => "System.Description",
            Self::Polarion => "description",
        }
    }

    /// Configuration keys that must be present and non-empty.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Jira => &["server", "username", "api_token"],
            Self::AzureDevOps => &["organization_url", "personal_access_token"],
            Self::Polarion => &["server_url", "username", "password"],
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-backend connection parameters.
///
/// Produced by a [`SecretSource`](crate::domain::ports::secret_source::SecretSource)
/// and handed to the adapter constructor by value. The `Debug` impl never
/// prints secret values.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterConfig {
    values: Map<String, Value>,
}

impl AdapterConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from a JSON object.
    pub fn from_json(value: Value) -> AlmResult<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(AlmError::Configuration(format!(
                "adapter configuration must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Add an entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value lookup; empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Boolean lookup with a default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Unsigned integer lookup. Accepts numbers and numeric strings.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Required string lookup.
    pub fn require(&self, key: &str) -> AlmResult<&str> {
        self.get_str(key).ok_or_else(|| {
            AlmError::Configuration(format!("missing required configuration field: {key}"))
        })
    }

    /// Check that every key is present and non-empty.
    pub fn validate_required(&self, keys: &[&str]) -> AlmResult<()> {
        let missing: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !self.is_present(k))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AlmError::Configuration(format!(
                "missing required configuration field(s): {}",
                missing.join(", ")
            )))
        }
    }

    fn is_present(&self, key: &str) -> bool {
        match self.values.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// A copy of the configuration with secret-looking values replaced.
    pub fn redacted(&self) -> Map<String, Value> {
        redact_map(&self.values)
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("values", &self.redacted())
            .finish()
    }
}

/// Whether a configuration key names a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

fn redact_map(values: &Map<String, Value>) -> Map<String, Value> {
    values
        .iter()
        .map(|(k, v)| {
            let v = if is_sensitive_key(k) {
                Value::String(REDACTED.to_string())
            } else {
                redact_value(v)
            };
            (k.clone(), v)
        })
        .collect()
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Static description of a configured adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Human-readable name (e.g. "Jira Adapter").
    pub name: String,
    /// Adapter version.
    pub version: String,
    /// Backend kind.
    pub kind: AdapterKind,
    /// Endpoint the adapter talks to. Never contains credentials.
    pub endpoint: String,
    /// Remote API version in use.
    pub api_version: String,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
}

/// Result of an adapter health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the backend answered as expected.
    pub healthy: bool,
    /// Backend-specific details (server, user, session state, error).
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl HealthReport {
    /// A healthy report.
    pub fn healthy(details: Map<String, Value>) -> Self {
        Self {
            healthy: true,
            details,
        }
    }

    /// An unhealthy report carrying an error message.
    pub fn unhealthy(error: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("error".to_string(), Value::String(error.into()));
        Self {
            healthy: false,
            details,
        }
    }
}

/// Aggregated health of every configured adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// False if any adapter is unhealthy.
    pub overall_healthy: bool,
    /// Per-backend reports keyed by backend identifier.
    pub adapters: BTreeMap<String, HealthReport>,
}
