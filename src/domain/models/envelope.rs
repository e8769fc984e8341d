//! Uniform operation result returned by every adapter contract call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::AlmError;

/// Success/error envelope.
///
/// Contract operations never return `Err`; failures are carried in
/// `error` with `success == false`. `data` holds the operation-specific
/// payload (`item_id`, `item`, `items`, `projects`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Operation payload.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// Human-readable error message when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the adapter that produced this result.
    pub adapter: String,
}

impl OperationResult {
    /// A successful result with the given payload.
    pub fn ok(adapter: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            adapter: adapter.into(),
        }
    }

    /// A successful result without payload.
    pub fn empty(adapter: impl Into<String>) -> Self {
        Self::ok(adapter, Map::new())
    }

    /// A failed result.
    pub fn fail(adapter: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(error.into()),
            adapter: adapter.into(),
        }
    }

    /// A failed result built from a domain error.
    pub fn from_error(adapter: impl Into<String>, err: &AlmError) -> Self {
        Self::fail(adapter, err.to_string())
    }

    /// Add a payload entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Payload lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// String payload lookup.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// The `item_id` returned by `create_item`.
    pub fn item_id(&self) -> Option<&str> {
        self.get_str("item_id")
    }

    /// The error message, or an empty string on success.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}
