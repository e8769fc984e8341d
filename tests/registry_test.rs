//! Registry wiring: secrets, backend isolation, health and cleanup.

mod common;

use almsync::domain::models::{BackendSettings, BackendsConfig};
use almsync::infrastructure::secrets::StaticSecretSource;
use almsync::{AdapterKind, AdapterRegistry, AlmError, ItemQuery, ProjectConfig};
use common::{ado_config, jira_config, polarion_config, settings, soap_body};
use mockito::{Matcher, Mock, Server, ServerGuard};

async fn healthy_jira(server: &mut ServerGuard) -> (Mock, Mock) {
    let info = server
        .mock("GET", "/rest/api/2/serverInfo")
        .with_status(200)
        .with_body(r#"{"version": "9.12.0"}"#)
        .create_async()
        .await;
    let myself = server
        .mock("GET", "/rest/api/2/myself")
        .with_status(200)
        .with_body(r#"{"displayName": "Sync Bot"}"#)
        .create_async()
        .await;
    (info, myself)
}

fn only(kinds: &[AdapterKind]) -> BackendsConfig {
    let setting = |kind| BackendSettings {
        enabled: kinds.contains(&kind),
        ..BackendSettings::default()
    };
    BackendsConfig {
        jira: setting(AdapterKind::Jira),
        azure_devops: setting(AdapterKind::AzureDevOps),
        polarion: setting(AdapterKind::Polarion),
    }
}

#[tokio::test]
async fn test_failing_backend_does_not_block_others() {
    let mut jira = Server::new_async().await;
    let mut ado = Server::new_async().await;
    let _jira = healthy_jira(&mut jira).await;
    let _ado = ado
        .mock("GET", "/acme/_apis/projects")
        .match_query(Matcher::Any)
        .with_status(401)
        .create_async()
        .await;

    let secrets = StaticSecretSource::new()
        .with("jira", jira_config(&jira.url()))
        .with("azure_devops", ado_config(&ado.url()));
    let mut registry = AdapterRegistry::new(settings());
    registry
        .initialize(&secrets, &BackendsConfig::default())
        .await
        .unwrap();

    assert_eq!(registry.list_available(), vec![AdapterKind::Jira]);
    assert_eq!(registry.adapter_info().len(), 1);

    let result = registry
        .query_items(
            AdapterKind::AzureDevOps,
            &ItemQuery::default(),
            &ProjectConfig::for_project("Med"),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error_message(), "Adapter for azure_devops not available");
    assert_eq!(result.adapter, "Azure DevOps Adapter");

    let status = registry.get_health_status().await;
    assert!(status.overall_healthy);
    assert_eq!(status.adapters.len(), 1);
    assert!(status.adapters["jira"].healthy);
}

#[tokio::test]
async fn test_polarion_login_failure_leaves_rest_backends_available() {
    let mut jira = Server::new_async().await;
    let mut ado = Server::new_async().await;
    let mut polarion = Server::new_async().await;
    let _jira = healthy_jira(&mut jira).await;
    let _ado = ado
        .mock("GET", "/acme/_apis/projects")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"count": 1, "value": [{"id": "p-1", "name": "Med"}]}"#)
        .create_async()
        .await;
    let login = polarion
        .mock("POST", "/polarion/ws/services/SessionWebService")
        .with_status(500)
        .with_body(soap_body(
            "<soapenv:Fault><faultcode>soapenv:Server</faultcode>\
             <faultstring>Authentication failed: invalid user</faultstring></soapenv:Fault>",
        ))
        .expect_at_least(1)
        .create_async()
        .await;

    let secrets = StaticSecretSource::new()
        .with("jira", jira_config(&jira.url()))
        .with("azure_devops", ado_config(&ado.url()))
        .with("polarion", polarion_config(&polarion.url()));
    let mut registry = AdapterRegistry::new(settings());
    registry
        .initialize(&secrets, &BackendsConfig::default())
        .await
        .unwrap();

    assert_eq!(
        registry.list_available(),
        vec![AdapterKind::Jira, AdapterKind::AzureDevOps]
    );
    let result = registry.test_connection(AdapterKind::Polarion).await;
    assert!(!result.success);
    assert_eq!(result.error_message(), "Adapter for polarion not available");
    assert_eq!(result.adapter, "Polarion Adapter");

    assert!(registry.test_connection(AdapterKind::Jira).await.success);
    assert!(registry.test_connection(AdapterKind::AzureDevOps).await.success);
    login.assert_async().await;
}

#[tokio::test]
async fn test_required_backend_without_secret_fails_after_others_start() {
    let mut jira = Server::new_async().await;
    let _jira = healthy_jira(&mut jira).await;

    let mut backends = only(&[AdapterKind::Jira, AdapterKind::Polarion]);
    backends.polarion.required = true;
    backends.polarion.secret = Some("polarion-prod".to_string());

    let secrets = StaticSecretSource::new().with("jira", jira_config(&jira.url()));
    let mut registry = AdapterRegistry::new(settings());
    let err = registry.initialize(&secrets, &backends).await.unwrap_err();

    assert!(matches!(err, AlmError::Configuration(_)));
    assert!(err.to_string().contains("polarion-prod"), "got: {err}");
    assert!(registry.get_adapter(AdapterKind::Jira).is_some());
}

#[tokio::test]
async fn test_backend_overrides_reach_the_adapter() {
    let mut ado = Server::new_async().await;
    let projects = ado
        .mock("GET", "/acme/_apis/projects")
        .match_query(Matcher::UrlEncoded("api-version".into(), "7.1".into()))
        .with_status(200)
        .with_body(r#"{"count": 1, "value": [{"id": "p-1", "name": "Med"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let mut backends = only(&[AdapterKind::AzureDevOps]);
    backends.azure_devops.secret = Some("ado-main".to_string());
    backends.azure_devops.api_version = Some("7.1".to_string());

    let secrets = StaticSecretSource::new().with("ado-main", ado_config(&ado.url()));
    let mut registry = AdapterRegistry::new(settings());
    registry.initialize(&secrets, &backends).await.unwrap();

    let info = registry.adapter_info();
    assert_eq!(info[0].kind, AdapterKind::AzureDevOps);
    assert_eq!(info[0].api_version, "7.1");
    projects.assert_async().await;
}

#[tokio::test]
async fn test_unhealthy_adapter_fails_overall_health() {
    let mut jira = Server::new_async().await;
    let _info = jira
        .mock("GET", "/rest/api/2/serverInfo")
        .with_status(200)
        .with_body(r#"{"version": "9.12.0"}"#)
        .create_async()
        .await;
    let _myself = jira
        .mock("GET", "/rest/api/2/myself")
        .with_status(401)
        .with_body("token revoked")
        .create_async()
        .await;

    let secrets = StaticSecretSource::new().with("jira", jira_config(&jira.url()));
    let mut registry = AdapterRegistry::new(settings());
    registry
        .initialize(&secrets, &only(&[AdapterKind::Jira]))
        .await
        .unwrap();

    let status = registry.get_health_status().await;
    assert!(!status.overall_healthy);
    assert!(!status.adapters["jira"].healthy);
}

#[tokio::test]
async fn test_cleanup_forgets_adapters() {
    let mut jira = Server::new_async().await;
    let _jira = healthy_jira(&mut jira).await;

    let secrets = StaticSecretSource::new().with("jira", jira_config(&jira.url()));
    let mut registry = AdapterRegistry::new(settings());
    registry
        .initialize(&secrets, &only(&[AdapterKind::Jira]))
        .await
        .unwrap();
    assert!(registry.has_adapters());

    registry.cleanup().await;
    assert!(!registry.has_adapters());
    let result = registry.test_connection(AdapterKind::Jira).await;
    assert_eq!(result.error_message(), "Adapter for jira not available");
}
