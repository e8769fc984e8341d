//! Secret sources
//!
//! Adapter connection parameters are stored as JSON objects, one secret per
//! backend:
//! - `EnvSecretSource`: `ALMSYNC_SECRET_<NAME>` environment variables
//! - `FileSecretSource`: `<dir>/<name>.json` files
//! - `StaticSecretSource`: in-memory, for embedding and tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::AdapterConfig;
use crate::domain::ports::SecretSource;

/// Default prefix for secret environment variables.
pub const SECRET_ENV_PREFIX: &str = "ALMSYNC_SECRET_";

fn parse_secret(name: &str, raw: &str) -> AlmResult<AdapterConfig> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        AlmError::Configuration(format!("secret '{name}' is not valid JSON: {e}"))
    })?;
    AdapterConfig::from_json(value)
        .map_err(|e| AlmError::Configuration(format!("secret '{name}': {e}")))
}

/// Reads secrets from environment variables holding JSON.
#[derive(Debug, Clone)]
pub struct EnvSecretSource {
    prefix: String,
}

impl EnvSecretSource {
    /// Use the default `ALMSYNC_SECRET_` prefix.
    pub fn new() -> Self {
        Self::with_prefix(SECRET_ENV_PREFIX)
    }

    /// Use a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable consulted for `name`.
    pub fn var_name(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            name.to_uppercase().replace(['-', '.'], "_")
        )
    }
}

impl Default for EnvSecretSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn fetch(&self, name: &str) -> AlmResult<Option<AdapterConfig>> {
        match std::env::var(self.var_name(name)) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => parse_secret(name, &raw).map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(AlmError::Configuration(format!(
                "secret '{name}' could not be read: {e}"
            ))),
        }
    }
}

/// Reads secrets from `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    dir: PathBuf,
}

impl FileSecretSource {
    /// Read from `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &str) -> AlmResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(AlmError::Configuration(format!(
                "invalid secret name '{name}'"
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    async fn fetch(&self, name: &str) -> AlmResult<Option<AdapterConfig>> {
        let path = self.path_for(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => parse_secret(name, &raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AlmError::Configuration(format!(
                "secret file {} could not be read: {e}",
                path.display()
            ))),
        }
    }
}

/// In-memory secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource {
    secrets: HashMap<String, AdapterConfig>,
}

impl StaticSecretSource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret.
    pub fn with(mut self, name: impl Into<String>, config: AdapterConfig) -> Self {
        self.secrets.insert(name.into(), config);
        self
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch(&self, name: &str) -> AlmResult<Option<AdapterConfig>> {
        Ok(self.secrets.get(name).cloned())
    }
}
