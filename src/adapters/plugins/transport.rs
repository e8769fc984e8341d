//! HTTP plumbing shared by the backend clients.

use reqwest::{Client, Response};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::{AdapterConfig, Config, OperationResult, ProjectConfig};
use crate::infrastructure::logging::scrub;
use crate::infrastructure::retry::RetryPolicy;
use crate::services::field_mapper::map_fields;

/// Longest remote error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Transport settings applied to every backend client.
#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Default TLS verification; a backend's `verify_ssl` key overrides it.
    pub verify_ssl: bool,
    /// Retry policy for every remote round-trip.
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            verify_ssl: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientSettings {
    /// Settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.http.timeout_secs),
            verify_ssl: config.http.verify_ssl,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Build a `reqwest` client honouring the timeout and TLS settings.
pub fn build_http_client(settings: &ClientSettings, config: &AdapterConfig) -> AlmResult<Client> {
    let verify_ssl = config.get_bool("verify_ssl", settings.verify_ssl);
    Client::builder()
        .timeout(settings.timeout)
        .danger_accept_invalid_certs(!verify_ssl)
        .user_agent(concat!("almsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AlmError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Strip trailing slashes from a configured base URL and require a scheme.
pub fn normalize_base_url(raw: &str, key: &str) -> AlmResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AlmError::Configuration(format!(
            "{key} must be an http(s) URL, got '{}'",
            scrub(trimmed)
        )));
    }
    Ok(trimmed.to_string())
}

/// Pass successful responses through; classify the rest.
///
/// The remote body is scrubbed and truncated before it becomes part of the
/// error message.
pub async fn ensure_success(resp: Response) -> AlmResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = scrub(body.trim()).chars().take(MAX_ERROR_BODY).collect();
    Err(AlmError::from_status(status, body))
}

/// Parse a JSON body; empty bodies (204) become `Null`.
pub async fn read_json(resp: Response) -> AlmResult<Value> {
    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Convert an internal result into the contract envelope, logging failures.
pub fn envelope(
    adapter: &str,
    operation: &str,
    result: AlmResult<Map<String, Value>>,
) -> OperationResult {
    match result {
        Ok(data) => OperationResult::ok(adapter, data),
        Err(err) => {
            tracing::error!(adapter, operation, error = %err, "Adapter operation failed");
            OperationResult::fail(adapter, format!("Failed to {operation}: {err}"))
        }
    }
}

/// Item data as backend-keyed fields.
///
/// Data is mapped through the project's field mapping when one is set;
/// otherwise it is assumed to be keyed by backend field path already.
pub fn prepare_payload(
    data: &Map<String, Value>,
    project: &ProjectConfig,
) -> AlmResult<Map<String, Value>> {
    match &project.field_mapping {
        Some(mapping) => {
            mapping.validate()?;
            Ok(map_fields(data, mapping))
        }
        None => Ok(data.clone()),
    }
}

/// Field names of a payload, as a JSON array.
pub fn field_names(payload: &Map<String, Value>) -> Value {
    Value::Array(payload.keys().cloned().map(Value::String).collect())
}

/// Build a one-entry payload map.
pub fn single(key: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value.into());
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://jira.example.com/ ", "server").unwrap(),
            "https://jira.example.com"
        );
        assert!(matches!(
            normalize_base_url("jira.example.com", "server"),
            Err(AlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_envelope_wraps_errors() {
        let ok = envelope("Jira Adapter", "get item", Ok(single("item", json!({"key": "P-1"}))));
        assert!(ok.success);
        assert_eq!(ok.data["item"]["key"], "P-1");

        let failed = envelope(
            "Jira Adapter",
            "get item",
            Err(AlmError::NotFound("P-9".into())),
        );
        assert!(!failed.success);
        assert_eq!(failed.error_message(), "Failed to get item: Not found: P-9");
    }

    #[test]
    fn test_prepare_payload_maps_when_mapping_set() {
        use crate::domain::models::FieldMapping;

        let data = json!({"title": "T", "summary": "raw"}).as_object().cloned().unwrap();
        let raw = prepare_payload(&data, &ProjectConfig::for_project("P")).unwrap();
        assert_eq!(raw, data);

        let mapped = prepare_payload(
            &data,
            &ProjectConfig::for_project("P").with_mapping(FieldMapping::new().with("title", "summary")),
        )
        .unwrap();
        assert_eq!(Value::Object(mapped), json!({"summary": "T"}));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.http.timeout_secs = 5;
        config.http.verify_ssl = false;
        config.retry.max_attempts = 1;
        let settings = ClientSettings::from_config(&config);
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert!(!settings.verify_ssl);
        assert_eq!(settings.retry.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_ensure_success_classifies_and_scrubs() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/fail")
            .with_status(401)
            .with_body(r#"{"error": "bad", "api_token": "leaked-secret"}"#)
            .create_async()
            .await;
        let resp = Client::new()
            .get(format!("{}/fail", server.url()))
            .send()
            .await
            .unwrap();
        match ensure_success(resp).await {
            Err(AlmError::Authentication(msg)) => assert!(!msg.contains("leaked-secret")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
