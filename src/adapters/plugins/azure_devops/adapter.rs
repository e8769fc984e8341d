//! Azure DevOps implementation of the [`AlmAdapter`] contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::client::{AzureDevOpsClient, DEFAULT_API_VERSION};
use super::models::{relation_type, ATTACHED_FILE};
use super::patch::{add_relation, build_wiql, create_document, update_document};
use crate::adapters::plugins::transport::{self, single, ClientSettings};
use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::{
    AdapterConfig, AdapterInfo, AdapterKind, HealthReport, ItemQuery, OperationResult,
    ProjectConfig, SyncConfig, SyncResult, WorkItemRecord,
};
use crate::domain::ports::AlmAdapter;
use crate::services::reconciliation::sync_batch;

/// Work item type used when a sync config names none.
pub const DEFAULT_WORK_ITEM_TYPE: &str = "Requirement";

/// Result-page cap when `max_results` is not configured.
pub const DEFAULT_MAX_RESULTS: usize = 200;

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
    "json_patch",
];

/// Azure DevOps adapter.
pub struct AzureDevOpsAdapter {
    config: AdapterConfig,
    settings: ClientSettings,
    client: RwLock<Option<Arc<AzureDevOpsClient>>>,
}

impl AzureDevOpsAdapter {
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

    async fn client(&self) -> AlmResult<Arc<AzureDevOpsClient>> {
        self.client.read().await.clone().ok_or_else(|| {
            AlmError::Configuration("Azure DevOps adapter not initialized".to_string())
        })
    }

    async fn try_initialize(&self) -> AlmResult<()> {
        self.config
            .validate_required(AdapterKind::AzureDevOps.required_keys())?;
        let client = AzureDevOpsClient::new(&self.config, &self.settings)?;
        *self.client.write().await = Some(Arc::new(client));
        Ok(())
    }

    async fn try_test_connection(&self) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let projects = client.projects(Some(1)).await?;
        let mut data = single("connection_status", "connected");
        data.insert(
            "organization_url".to_string(),
            json!(client.organization_url()),
        );
        data.insert("projects_visible".to_string(), json!(!projects.is_empty()));
        Ok(data)
    }

    async fn try_create(
        &self,
        item_type: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let project_name = project.require_project()?;
        let payload = transport::prepare_payload(data, project)?;
        if payload.is_empty() {
            return Err(AlmError::Validation(
                "work item payload has no fields".to_string(),
            ));
        }

        let created = client
            .create_work_item(project_name, item_type, &create_document(&payload))
            .await?;
        info!(id = created.id, project = project_name, "Created Azure DevOps work item");

        let mut out = single("item_id", created.id.to_string());
        if let Some(uri) = created.html_url() {
            out.insert("uri".to_string(), json!(uri));
        }
        if let Some(rev) = created.rev {
            out.insert("rev".to_string(), json!(rev));
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

        // Diff against the live item so no no-op operations are sent.
        let current = client.work_item(item_id, false).await?;
        let document = update_document(&payload, &current.fields);
        let mut out = single("item_id", item_id);
        if document.is_empty() {
            debug!(id = item_id, "Work item already up to date");
            out.insert("updated_fields".to_string(), json!([]));
            return Ok(out);
        }

        let updated = client.update_work_item(item_id, &document).await?;
        let fields: Vec<&str> = document
            .iter()
            .filter_map(|op| op.path.strip_prefix("/fields/"))
            .collect();
        out.insert("updated_fields".to_string(), json!(fields));
        if let Some(rev) = updated.rev {
            out.insert("rev".to_string(), json!(rev));
        }
        Ok(out)
    }

    async fn try_query(
        &self,
        query: &ItemQuery,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let project_name = project.require_project()?;
        let wiql = build_wiql(project_name, query);
        let limit = query.limit(self.max_results());

        let mut ids = client.wiql(project_name, &wiql, limit).await?;
        ids.truncate(limit);
        let items: Vec<Value> = if ids.is_empty() {
            Vec::new()
        } else {
            client
                .work_items(&ids)
                .await?
                .iter()
                .map(super::models::WorkItem::summary_view)
                .collect()
        };

        let mut out = Map::new();
        out.insert("total".to_string(), json!(items.len()));
        out.insert("items".to_string(), Value::Array(items));
        out.insert("query".to_string(), json!(wiql));
        Ok(out)
    }

    async fn try_projects(&self) -> AlmResult<Map<String, Value>> {
        let projects = self
            .client()
            .await?
            .projects(None)
            .await?
            .iter()
            .map(|p| {
                json!({
                    "id": p.get("id"),
                    "name": p.get("name"),
                    "description": p.get("description"),
                    "state": p.get("state"),
                })
            })
            .collect();
        Ok(single("projects", Value::Array(projects)))
    }

    async fn try_item_types(&self, project: &ProjectConfig) -> AlmResult<Map<String, Value>> {
        let types = self
            .client()
            .await?
            .work_item_types(project.require_project()?)
            .await?
            .iter()
            .map(|t| {
                json!({
                    "name": t.get("name"),
                    "reference_name": t.get("referenceName"),
                    "description": t.get("description"),
                })
            })
            .collect();
        Ok(single("item_types", Value::Array(types)))
    }

    async fn try_fields(
        &self,
        item_type: &str,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let fields = self
            .client()
            .await?
            .work_item_type_fields(project.require_project()?, item_type)
            .await?
            .iter()
            .map(|f| {
                json!({
                    "reference_name": f.get("referenceName"),
                    "name": f.get("name"),
                    "required": f.get("alwaysRequired").and_then(Value::as_bool).unwrap_or(false),
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
        let states = self
            .client()
            .await?
            .work_item_type_states(project.require_project()?, item_type)
            .await?
            .iter()
            .map(|s| {
                json!({
                    "name": s.get("name"),
                    "category": s.get("category"),
                    "color": s.get("color"),
                })
            })
            .collect();
        Ok(single("workflows", Value::Array(states)))
    }

    async fn try_link(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: &str,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let rel = relation_type(link_type);
        let operation = add_relation(rel, &client.work_item_url(target_id), None);
        client
            .update_work_item(source_id, std::slice::from_ref(&operation))
            .await?;
        let mut out = single("source_id", source_id);
        out.insert("target_id".to_string(), json!(target_id));
        out.insert("link_type".to_string(), json!(rel));
        Ok(out)
    }

    async fn try_upload(
        &self,
        item_id: &str,
        content: &[u8],
        filename: &str,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let project_name = project.project.as_deref().filter(|p| !p.trim().is_empty());
        let attachment = client
            .upload_attachment(project_name, content, filename)
            .await?;
        let relation = add_relation(
            ATTACHED_FILE,
            &attachment.url,
            Some(json!({ "comment": format!("Uploaded {filename}") })),
        );
        client
            .update_work_item(item_id, std::slice::from_ref(&relation))
            .await?;

        let mut out = single("attachment_id", attachment.id);
        out.insert("url".to_string(), json!(attachment.url));
        out.insert("filename".to_string(), json!(filename));
        out.insert("size".to_string(), json!(content.len()));
        Ok(out)
    }
}

#[async_trait]
impl AlmAdapter for AzureDevOpsAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::AzureDevOps
    }

    fn name(&self) -> &str {
        AdapterKind::AzureDevOps.display_name()
    }

    fn get_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            kind: self.kind(),
            endpoint: self
                .config
                .get_str("organization_url")
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
        if !self.test_connection().await.success {
            *self.client.write().await = None;
            return false;
        }
        info!(adapter = self.name(), "Adapter initialized");
        true
    }

    async fn test_connection(&self) -> OperationResult {
        transport::envelope(
            self.name(),
            "connect to Azure DevOps",
            self.try_test_connection().await,
        )
    }

    async fn health_check(&self) -> HealthReport {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => return HealthReport::unhealthy(err.to_string()),
        };
        match client.connection_data().await {
            Ok(data) => {
                let mut details = single("organization_url", client.organization_url());
                details.insert(
                    "user".to_string(),
                    json!(data.pointer("/authenticatedUser/providerDisplayName")),
                );
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
        let Some(project_name) = sync_config.project() else {
            return SyncResult::aborted(
                AlmError::Validation(
                    "Azure DevOps project not specified in sync config".to_string(),
                )
                .to_string(),
            );
        };
        if let Err(err) = client.project(project_name).await {
            error!(adapter = self.name(), project = project_name, error = %err, "Project validation failed");
            return SyncResult::aborted(format!("Failed to validate project: {err}"));
        }

        info!(
            adapter = self.name(),
            project_id,
            project = project_name,
            records = records.len(),
            "Starting Azure DevOps sync"
        );
        let item_type = sync_config
            .item_type
            .as_deref()
            .unwrap_or(DEFAULT_WORK_ITEM_TYPE);
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
            let item = self.client().await?.work_item(item_id, true).await?;
            Ok(single("item", serde_json::to_value(item)?))
        }
        .await;
        transport::envelope(self.name(), "get item", result)
    }

    async fn delete_item(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            self.client().await?.delete_work_item(item_id).await?;
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

    async fn get_fields(&self, item_type: &str, project: &ProjectConfig) -> OperationResult {
        transport::envelope(
            self.name(),
            "get fields",
            self.try_fields(item_type, project).await,
        )
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
        transport::envelope(
            self.name(),
            "create link",
            self.try_link(source_id, target_id, link_type).await,
        )
    }

    async fn get_links(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let item = self.client().await?.work_item(item_id, true).await?;
            Ok(single("links", Value::Array(item.links())))
        }
        .await;
        transport::envelope(self.name(), "get links", result)
    }

    async fn upload_attachment(
        &self,
        item_id: &str,
        content: &[u8],
        filename: &str,
        project: &ProjectConfig,
    ) -> OperationResult {
        transport::envelope(
            self.name(),
            "upload attachment",
            self.try_upload(item_id, content, filename, project).await,
        )
    }

    async fn get_attachments(&self, item_id: &str, _project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let item = self.client().await?.work_item(item_id, true).await?;
            Ok(single("attachments", Value::Array(item.attachments())))
        }
        .await;
        transport::envelope(self.name(), "get attachments", result)
    }

    async fn cleanup(&self) -> AlmResult<()> {
        *self.client.write().await = None;
        Ok(())
    }
}
