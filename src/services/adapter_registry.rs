//! Adapter registry for configured ALM backends.
//!
//! The [`AdapterRegistry`] holds at most one initialized adapter per
//! [`AdapterKind`] and dispatches operations by kind. Backends come up
//! independently: one backend failing to initialize never blocks the
//! others.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::adapters::plugins::create_adapter;
use crate::adapters::plugins::transport::ClientSettings;
use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::{
    AdapterInfo, AdapterKind, BackendsConfig, HealthStatus, ItemQuery, OperationResult,
    ProjectConfig, SyncConfig, SyncResult, WorkItemRecord,
};
use crate::domain::ports::{AlmAdapter, SecretSource};

/// Central registry of available adapters.
pub struct AdapterRegistry {
    settings: ClientSettings,
    adapters: HashMap<AdapterKind, Arc<dyn AlmAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.list_available())
            .finish_non_exhaustive()
    }
}

impl Default for AdapterRegistry {
    /// Returns an empty registry with default transport settings.
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}

impl AdapterRegistry {
    /// Create an empty registry whose adapters use `settings`.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            adapters: HashMap::new(),
        }
    }

    /// Load every enabled backend's secret, then construct the adapters and
    /// initialize them concurrently.
    ///
    /// Backends without credentials or failing to initialize are left out
    /// and logged.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when a backend marked `required` has no
    /// readable credentials. The other backends are still brought up first.
    pub async fn initialize(
        &mut self,
        source: &dyn SecretSource,
        backends: &BackendsConfig,
    ) -> AlmResult<()> {
        let mut missing = Vec::new();
        let mut pending = Vec::new();

        for kind in AdapterKind::ALL {
            let settings = backends.get(kind);
            if !settings.enabled {
                info!(backend = %kind, "Backend disabled, skipping");
                continue;
            }

            let secret = settings.secret_name(kind);
            let mut config = match source.fetch(&secret).await {
                Ok(Some(config)) => config,
                Ok(None) => {
                    if settings.required {
                        missing.push(format!("{kind} (secret '{secret}' not found)"));
                    } else {
                        info!(backend = %kind, secret = %secret, "No credentials configured, skipping");
                    }
                    continue;
                }
                Err(err) => {
                    if settings.required {
                        missing.push(format!("{kind} ({err})"));
                    } else {
                        warn!(backend = %kind, secret = %secret, error = %err, "Failed to read credentials, skipping");
                    }
                    continue;
                }
            };

            if let Some(api_version) = &settings.api_version {
                config = config.with("api_version", api_version.clone());
            }
            if let Some(max_results) = settings.max_results {
                config = config.with("max_results", max_results);
            }

            pending.push(create_adapter(kind, config, self.settings));
        }

        let ready = join_all(pending.iter().map(|adapter| adapter.initialize())).await;
        for (adapter, ready) in pending.into_iter().zip(ready) {
            let kind = adapter.kind();
            if ready {
                info!(backend = %kind, "Adapter available");
                self.adapters.insert(kind, adapter);
            } else {
                warn!(backend = %kind, "Adapter failed to initialize and is unavailable");
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AlmError::Configuration(format!(
                "missing credentials for required backend(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Add an already-initialized adapter, replacing any of the same kind.
    pub fn register(&mut self, adapter: Arc<dyn AlmAdapter>) -> Option<Arc<dyn AlmAdapter>> {
        self.adapters.insert(adapter.kind(), adapter)
    }

    /// Look up an adapter by kind.
    pub fn get_adapter(&self, kind: AdapterKind) -> Option<Arc<dyn AlmAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Kinds with an available adapter, in dispatch order.
    pub fn list_available(&self) -> Vec<AdapterKind> {
        AdapterKind::ALL
            .into_iter()
            .filter(|kind| self.adapters.contains_key(kind))
            .collect()
    }

    /// Info for every available adapter.
    pub fn adapter_info(&self) -> Vec<AdapterInfo> {
        self.list_available()
            .into_iter()
            .filter_map(|kind| self.adapters.get(&kind))
            .map(|adapter| adapter.get_info())
            .collect()
    }

    /// Whether any adapter is available.
    pub fn has_adapters(&self) -> bool {
        !self.adapters.is_empty()
    }

    fn unavailable(kind: AdapterKind) -> String {
        format!("Adapter for {kind} not available")
    }

    fn dispatch(&self, kind: AdapterKind) -> Result<&Arc<dyn AlmAdapter>, OperationResult> {
        self.adapters
            .get(&kind)
            .ok_or_else(|| OperationResult::fail(kind.display_name(), Self::unavailable(kind)))
    }

    /// [`AlmAdapter::test_connection`] on the named backend.
    pub async fn test_connection(&self, kind: AdapterKind) -> OperationResult {
        match self.dispatch(kind) {
            Ok(adapter) => adapter.test_connection().await,
            Err(unavailable) => unavailable,
        }
    }

    /// [`AlmAdapter::sync_project`] on the named backend.
    pub async fn sync_project(
        &self,
        kind: AdapterKind,
        project_id: &str,
        sync_config: &SyncConfig,
        records: &mut [WorkItemRecord],
    ) -> SyncResult {
        match self.adapters.get(&kind) {
            Some(adapter) => adapter.sync_project(project_id, sync_config, records).await,
            None => SyncResult::aborted(Self::unavailable(kind)),
        }
    }

    /// [`AlmAdapter::create_item`] on the named backend.
    pub async fn create_item(
        &self,
        kind: AdapterKind,
        item_type: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> OperationResult {
        match self.dispatch(kind) {
            Ok(adapter) => adapter.create_item(item_type, data, project).await,
            Err(unavailable) => unavailable,
        }
    }

    /// [`AlmAdapter::update_item`] on the named backend.
    pub async fn update_item(
        &self,
        kind: AdapterKind,
        item_id: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> OperationResult {
        match self.dispatch(kind) {
            Ok(adapter) => adapter.update_item(item_id, data, project).await,
            Err(unavailable) => unavailable,
        }
    }

    /// [`AlmAdapter::get_item`] on the named backend.
    pub async fn get_item(
        &self,
        kind: AdapterKind,
        item_id: &str,
        project: &ProjectConfig,
    ) -> OperationResult {
        match self.dispatch(kind) {
            Ok(adapter) => adapter.get_item(item_id, project).await,
            Err(unavailable) => unavailable,
        }
    }

    /// [`AlmAdapter::query_items`] on the named backend.
    pub async fn query_items(
        &self,
        kind: AdapterKind,
        query: &ItemQuery,
        project: &ProjectConfig,
    ) -> OperationResult {
        match self.dispatch(kind) {
            Ok(adapter) => adapter.query_items(query, project).await,
            Err(unavailable) => unavailable,
        }
    }

    /// Health of every available adapter, checked concurrently.
    ///
    /// Overall health is false if any adapter reports unhealthy.
    pub async fn get_health_status(&self) -> HealthStatus {
        let checks = self.list_available().into_iter().filter_map(|kind| {
            let adapter = self.adapters.get(&kind)?;
            Some(async move { (kind, adapter.health_check().await) })
        });
        let adapters: BTreeMap<String, _> = join_all(checks)
            .await
            .into_iter()
            .map(|(kind, report)| (kind.as_str().to_string(), report))
            .collect();
        HealthStatus {
            overall_healthy: adapters.values().all(|report| report.healthy),
            adapters,
        }
    }

    /// Release every adapter's session and client, then forget them.
    ///
    /// A failing cleanup is logged and does not stop the others.
    pub async fn cleanup(&mut self) {
        for kind in self.list_available() {
            if let Some(adapter) = self.adapters.get(&kind) {
                match adapter.cleanup().await {
                    Ok(()) => info!(backend = %kind, "Adapter cleaned up"),
                    Err(err) => warn!(backend = %kind, error = %err, "Adapter cleanup failed"),
                }
            }
        }
        self.adapters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BackendSettings;
    use crate::infrastructure::secrets::StaticSecretSource;

    #[test]
    fn test_default_registry_is_empty() {
        let registry = AdapterRegistry::default();
        assert!(!registry.has_adapters());
        assert!(registry.list_available().is_empty());
        assert!(registry.get_adapter(AdapterKind::Jira).is_none());
    }

    #[tokio::test]
    async fn test_unavailable_backend_returns_error_envelope() {
        let registry = AdapterRegistry::default();
        let result = registry
            .get_item(AdapterKind::Polarion, "WI-1", &ProjectConfig::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.error_message(), "Adapter for polarion not available");

        let mut records = Vec::new();
        let sync = registry
            .sync_project(
                AdapterKind::Jira,
                "p1",
                &SyncConfig::new("PROJ"),
                &mut records,
            )
            .await;
        assert_eq!(
            sync.batch_error.as_deref(),
            Some("Adapter for jira not available")
        );
    }

    #[tokio::test]
    async fn test_missing_optional_credentials_are_skipped() {
        let mut registry = AdapterRegistry::default();
        registry
            .initialize(&StaticSecretSource::new(), &BackendsConfig::default())
            .await
            .unwrap();
        assert!(!registry.has_adapters());
    }

    #[tokio::test]
    async fn test_missing_required_credentials_propagate() {
        let backends = BackendsConfig {
            azure_devops: BackendSettings {
                required: true,
                ..BackendSettings::default()
            },
            ..BackendsConfig::default()
        };
        let mut registry = AdapterRegistry::default();
        let err = registry
            .initialize(&StaticSecretSource::new(), &backends)
            .await
            .unwrap_err();
        assert!(matches!(err, AlmError::Configuration(_)));
        assert!(err.to_string().contains("azure_devops"), "got: {err}");
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let status = AdapterRegistry::default().get_health_status().await;
        assert!(status.overall_healthy);
        assert!(status.adapters.is_empty());
    }
}
