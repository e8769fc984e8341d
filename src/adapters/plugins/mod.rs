//! Native adapter plugins.
//!
//! Each sub-module corresponds to one ALM backend and implements the
//! [`AlmAdapter`] port directly. [`create_adapter`] is the only place that
//! branches on the backend kind.

pub mod azure_devops;
pub mod jira;
pub mod polarion;
pub mod transport;

use std::sync::Arc;

use crate::domain::models::{AdapterConfig, AdapterKind};
use crate::domain::ports::AlmAdapter;

use self::azure_devops::AzureDevOpsAdapter;
use self::jira::JiraAdapter;
use self::polarion::PolarionAdapter;
use self::transport::ClientSettings;

/// Construct an uninitialized adapter for `kind`.
///
/// The adapter owns `config`; nothing touches the network until
/// [`AlmAdapter::initialize`] is called.
pub fn create_adapter(
    kind: AdapterKind,
    config: AdapterConfig,
    settings: ClientSettings,
) -> Arc<dyn AlmAdapter> {
    match kind {
        AdapterKind::Jira => Arc::new(JiraAdapter::new(config, settings)),
        AdapterKind::AzureDevOps => Arc::new(AzureDevOpsAdapter::new(config, settings)),
        AdapterKind::Polarion => Arc::new(PolarionAdapter::new(config, settings)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_matching_kind() {
        for kind in AdapterKind::ALL {
            let adapter = create_adapter(kind, AdapterConfig::new(), ClientSettings::default());
            assert_eq!(adapter.kind(), kind);
            assert_eq!(adapter.name(), kind.display_name());
        }
    }

    #[test]
    fn test_info_never_exposes_credentials() {
        let config = AdapterConfig::new()
            .with("server", "https://jira.example.com")
            .with("username", "bot")
            .with("api_token", "s3cr3t");
        let adapter = create_adapter(AdapterKind::Jira, config, ClientSettings::default());
        let info = serde_json::to_string(&adapter.get_info()).unwrap();
        assert!(info.contains("https://jira.example.com"));
        assert!(!info.contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_initialize_fails_on_missing_keys() {
        for kind in AdapterKind::ALL {
            let adapter = create_adapter(kind, AdapterConfig::new(), ClientSettings::default());
            assert!(!adapter.initialize().await, "{kind} should not initialize");
            let result = adapter.test_connection().await;
            assert!(!result.success);
            assert!(
                result.error_message().contains("not initialized"),
                "{kind}: {:?}",
                result.error
            );
        }
    }
}
