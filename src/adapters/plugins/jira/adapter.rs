//! Jira implementation of the [`AlmAdapter`] contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info};

use super::client::{JiraClient, DEFAULT_API_VERSION};
use super::models::{build_jql, expand_fields};
use crate::adapters::plugins::transport::{self, single, ClientSettings};
use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::{
    AdapterConfig, AdapterInfo, AdapterKind, HealthReport, ItemQuery, OperationResult,
    ProjectConfig, SyncConfig, SyncResult, WorkItemRecord,
};
use crate::domain::ports::AlmAdapter;
use crate::services::reconciliation::sync_batch;

/// Issue type used when a sync config names none.
pub const DEFAULT_ISSUE_TYPE: &str = "Story";

/// Result-page cap when `max_results` is not configured.
pub const DEFAULT_MAX_RESULTS: usize = 100;

const CAPABILITIES: &[&str] = &[
    "create_item",
    "update_item",
    "get_item",
    "delete_item",
    "query_items",
    "get_projects",
    "get_item_types",
    "get_fields",
    "get_workflows",
    "create_link",
    "get_links",
    "upload_attachment",
    "get_attachments",
    "sync_project",
];

/// Jira adapter.
pub struct JiraAdapter {
    config: AdapterConfig,
    settings: ClientSettings,
    client: RwLock<Option<Arc<JiraClient>>>,
}

impl JiraAdapter {
    /// Create an uninitialized adapter.
    pub fn new(config: AdapterConfig, settings: ClientSettings) -> Self {
        Self {
            config,
            settings,
            client: RwLock::new(None),
        }
    }

    fn max_results(&self) -> usize {
        self.config
            .get_u64("max_results")
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_RESULTS)
    }

    async fn client(&self) -> AlmResult<Arc<JiraClient>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| AlmError::Configuration("Jira adapter not initialized".to_string()))
    }

    async fn try_initialize(&self) -> AlmResult<()> {
        self.config
            .validate_required(AdapterKind::Jira.required_keys())?;
        let client = JiraClient::new(&self.config, &self.settings)?;
        *self.client.write().await = Some(Arc::new(client));
        Ok(())
    }

    async fn try_test_connection(&self) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let info = client.server_info().await?;
        let mut data = Map::new();
        data.insert(
            "server_info".to_string(),
            json!({
                "version": info.get("version"),
                "server_title": info.get("serverTitle"),
                "base_url": info.get("baseUrl"),
            }),
        );
        data.insert("connection_status".to_string(), json!("connected"));
        Ok(data)
    }

    async fn try_create(
        &self,
        item_type: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let project_key = project.require_project()?;
        let payload = transport::prepare_payload(data, project)?;

        let mut fields = expand_fields(&payload);
        fields.insert("project".to_string(), json!({ "key": project_key }));
        fields.insert("issuetype".to_string(), json!({ "name": item_type }));

        let created = client.create_issue(fields).await?;
        info!(key = %created.key, project = project_key, "Created Jira issue");

        let mut out = Map::new();
        out.insert("item_id".to_string(), json!(created.key));
        out.insert("id".to_string(), json!(created.id));
        out.insert("uri".to_string(), json!(client.browse_url(&created.key)));
        if let Some(url) = created.self_url {
            out.insert("url".to_string(), json!(url));
        }
        Ok(out)
    }

    async fn try_update(
        &self,
        item_id: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let payload = transport::prepare_payload(data, project)?;
        if !payload.is_empty() {
            client.update_issue(item_id, expand_fields(&payload)).await?;
        }
        let mut out = single("item_id", item_id);
        out.insert(
            "updated_fields".to_string(),
            transport::field_names(&payload),
        );
        Ok(out)
    }

    async fn try_query(
        &self,
        query: &ItemQuery,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let jql = build_jql(project.require_project()?, query);
        let limit = query.limit(self.max_results());

        let mut items = Vec::new();
        let mut total;
        loop {
            let page = client.search(&jql, items.len(), limit - items.len()).await?;
            total = page.total;
            let fetched = page.issues.len();
            items.extend(page.issues.iter().map(|issue| issue.summary_view()));
            if fetched == 0 || items.len() >= limit || page.start_at + fetched >= page.total {
                break;
            }
        }

        let mut out = Map::new();
        out.insert("total".to_string(), json!(total));
        out.insert("items".to_string(), Value::Array(items));
        out.insert("query".to_string(), json!(jql));
        Ok(out)
    }

    async fn try_projects(&self) -> AlmResult<Map<String, Value>> {
        let projects = self
            .client()
            .await?
            .projects()
            .await?
            .iter()
            .map(|p| {
                json!({
                    "id": p.get("id"),
                    "key": p.get("key"),
                    "name": p.get("name"),
                    "project_type": p.get("projectTypeKey"),
                })
            })
            .collect();
        Ok(single("projects", Value::Array(projects)))
    }

    async fn try_item_types(&self, project: &ProjectConfig) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let details = client.project(project.require_project()?).await?;
        let types = details
            .get("issueTypes")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .map(|t| {
                        json!({
                            "id": t.get("id"),
                            "name": t.get("name"),
                            "description": t.get("description"),
                            "subtask": t.get("subtask").and_then(Value::as_bool).unwrap_or(false),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(single("item_types", Value::Array(types)))
    }

    async fn try_fields(&self) -> AlmResult<Map<String, Value>> {
        let fields = self
            .client()
            .await?
            .fields()
            .await?
            .iter()
            .map(|f| {
                json!({
                    "id": f.get("id"),
                    "name": f.get("name"),
                    "custom": f.get("custom").and_then(Value::as_bool).unwrap_or(false),
                    "type": f.pointer("/schema/type"),
                })
            })
            .collect();
        Ok(single("fields", Value::Array(fields)))
    }

    async fn try_workflows(
        &self,
        item_type: &str,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let per_type = client.project_statuses(project.require_project()?).await?;
        let entry = per_type
            .iter()
            .find(|t| t.get("name").and_then(Value::as_str) == Some(item_type))
            .ok_or_else(|| AlmError::NotFound(format!("issue type '{item_type}'")))?;
        let states = entry
            .get("statuses")
            .and_then(Value::as_array)
            .map(|statuses| {
                statuses
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.get("id"),
                            "name": s.get("name"),
                            "category": s.pointer("/statusCategory/name"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(single("workflows", Value::Array(states)))
    }

    async fn validate_project(&self, client: &JiraClient, key: &str) -> AlmResult<()> {
        client.project(key).await.map(|_| ()).map_err(|err| match err {
            AlmError::NotFound(_) => AlmError::NotFound(format!("Jira project '{key}'")),
            other => other,
        })
    }
}

#[async_trait]
impl AlmAdapter for JiraAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Jira
    }

    fn name(&self) -> &str {
        AdapterKind::Jira.display_name()
    }

    fn get_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            kind: self.kind(),
            endpoint: self
                .config
                .get_str("server")
                .unwrap_or_default()
                .to_string(),
            api_version: self
                .config
                .get_str("api_version")
                .unwrap_or(DEFAULT_API_VERSION)
                .to_string(),
            capabilities: CAPABILITIES.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    async fn initialize(&self) -> bool {
        if let Err(err) = self.try_initialize().await {
            error!(adapter = self.name(), error = %err, "Adapter initialization failed");
            return false;
        }
        let check = self.test_connection().await;
        if !check.success {
            *self.client.write().await = None;
            return false;
        }
        info!(adapter = self.name(), "Adapter initialized");
        true
    }

    async fn test_connection(&self) -> OperationResult {
        transport::envelope(self.name(), "connect to Jira", self.try_test_connection().await)
    }

    async fn health_check(&self) -> HealthReport {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => return HealthReport::unhealthy(err.to_string()),
        };
        match client.myself().await {
            Ok(user) => {
                let mut details = Map::new();
                details.insert("server".to_string(), json!(client.server()));
                details.insert("user".to_string(), json!(user.get("displayName")));
                details.insert("connection_status".to_string(), json!("connected"));
                HealthReport::healthy(details)
            }
            Err(err) => HealthReport::unhealthy(err.to_string()),
        }
    }

    async fn sync_project(
        &self,
        project_id: &str,
        sync_config: &SyncConfig,
        records: &mut [WorkItemRecord],
    ) -> SyncResult {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => return SyncResult::aborted(err.to_string()),
        };
        let Some(project_key) = sync_config.project() else {
            return SyncResult::aborted(
                AlmError::Validation("Jira project key not specified in sync config".to_string())
                    .to_string(),
            );
        };
        if let Err(err) = self.validate_project(&client, project_key).await {
            error!(adapter = self.name(), project = project_key, error = %err, "Project validation failed");
            return SyncResult::aborted(format!("Failed to validate project: {err}"));
        }

        info!(
            adapter = self.name(),
            project_id,
            project = project_key,
            records = records.len(),
            "Starting Jira sync"
        );
        let item_type = sync_config.item_type.as_deref().unwrap_or(DEFAULT_ISSUE_TYPE);
        sync_batch(self, sync_config, item_type, records).await
    }

    async fn create_item(
        &self,
        item_type: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> OperationResult {
        transport::envelope(
            self.name(),
            "create item",
            self.try_create(item_type, data, project).await,
        )
    }

    async fn update_item(
        &self,
        item_id: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> OperationResult {
        transport::envelope(
            self.name(),
            "update item",
            self.try_update(item_id, data, project).await,
        )
    }

    async fn get_item(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let issue = self.client().await?.issue(item_id, None).await?;
            Ok(single("item", serde_json::to_value(issue)?))
        }
        .await;
        transport::envelope(self.name(), "get item", result)
    }

    async fn delete_item(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            self.client().await?.delete_issue(item_id).await?;
            Ok(single("item_id", item_id))
        }
        .await;
        transport::envelope(self.name(), "delete item", result)
    }

    async fn query_items(&self, query: &ItemQuery, project: &ProjectConfig) -> OperationResult {
        transport::envelope(
            self.name(),
            "query items",
            self.try_query(query, project).await,
        )
    }

    async fn get_projects(&self) -> OperationResult {
        transport::envelope(self.name(), "get projects", self.try_projects().await)
    }

    async fn get_item_types(&self, project: &ProjectConfig) -> OperationResult {
        transport::envelope(
            self.name(),
            "get item types",
            self.try_item_types(project).await,
        )
    }

    async fn get_fields(&self, _item_type: &str, _project: &ProjectConfig) -> OperationResult {
        transport::envelope(self.name(), "get fields", self.try_fields().await)
    }

    async fn get_workflows(&self, item_type: &str, project: &ProjectConfig) -> OperationResult {
        transport::envelope(
            self.name(),
            "get workflows",
            self.try_workflows(item_type, project).await,
        )
    }

    async fn create_link(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: &str,
        _project: &ProjectConfig,
    ) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            self.client()
                .await?
                .create_link(link_type, source_id, target_id)
                .await?;
            let mut out = single("source_id", source_id);
            out.insert("target_id".to_string(), json!(target_id));
            out.insert("link_type".to_string(), json!(link_type));
            Ok(out)
        }
        .await;
        transport::envelope(self.name(), "create link", result)
    }

    async fn get_links(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let issue = self
                .client()
                .await?
                .issue(item_id, Some("issuelinks"))
                .await?;
            Ok(single("links", Value::Array(issue.links())))
        }
        .await;
        transport::envelope(self.name(), "get links", result)
    }

    async fn upload_attachment(
        &self,
        item_id: &str,
        content: &[u8],
        filename: &str,
        _project: &ProjectConfig,
    ) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let uploaded = self
                .client()
                .await?
                .add_attachment(item_id, content, filename)
                .await?;
            let first = uploaded.first().ok_or_else(|| {
                AlmError::Protocol("attachment upload returned no attachments".to_string())
            })?;
            let mut out = Map::new();
            out.insert("attachment_id".to_string(), json!(first.get("id")));
            out.insert("filename".to_string(), json!(filename));
            out.insert("size".to_string(), json!(content.len()));
            Ok(out)
        }
        .await;
        transport::envelope(self.name(), "upload attachment", result)
    }

    async fn get_attachments(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let issue = self
                .client()
                .await?
                .issue(item_id, Some("attachment"))
                .await?;
            Ok(single("attachments", Value::Array(issue.attachments())))
        }
        .await;
        transport::envelope(self.name(), "get attachments", result)
    }

    async fn cleanup(&self) -> AlmResult<()> {
        *self.client.write().await = None;
        Ok(())
    }
}
