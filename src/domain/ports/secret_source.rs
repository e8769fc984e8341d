//! Secret source port.

use async_trait::async_trait;

use crate::domain::errors::AlmResult;
use crate::domain::models::AdapterConfig;

/// Supplies per-backend connection parameters.
///
/// `Ok(None)` means the secret does not exist; `Err` means it exists but
/// could not be read or parsed.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the secret called `name`.
    async fn fetch(&self, name: &str) -> AlmResult<Option<AdapterConfig>>;
}
