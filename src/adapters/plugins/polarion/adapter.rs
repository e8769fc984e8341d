//! Polarion implementation of the [`AlmAdapter`] contract.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::client::PolarionClient;
use super::models::{
    attachments, build_lucene, id_from_uri, is_uri, links, summary_view, work_item_nodes,
    work_item_uri, work_item_view, BUILTIN_FIELDS,
};
use super::soap::{Node, Service, XmlElement};
use crate::adapters::plugins::transport::{self, single, ClientSettings};
use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::{
    AdapterConfig, AdapterInfo, AdapterKind, HealthReport, ItemQuery, OperationResult,
    ProjectConfig, SyncConfig, SyncResult, WorkItemRecord,
};
use crate::domain::ports::AlmAdapter;
use crate::services::reconciliation::sync_batch;

/// Work item type used when a sync config names none.
pub const DEFAULT_WORK_ITEM_TYPE: &str = "requirement";

/// Result-page cap when `max_results` is not configured.
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Web service generation reported by `get_info`.
const API_VERSION: &str = "ws";

/// Fields requested for query results.
const QUERY_FIELDS: &[&str] = &["id", "title", "type", "status", "created", "updated"];

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
    "session",
];

/// `{operation}Return` elements of a response body.
fn returns<'a>(body: &'a XmlElement, operation: &str) -> Vec<&'a XmlElement> {
    let response = format!("{operation}Response");
    let name = format!("{operation}Return");
    body.find(&response)
        .map(|r| r.children.iter().filter(|c| c.name == name).collect())
        .unwrap_or_default()
}

fn single_return<'a>(body: &'a XmlElement, operation: &str) -> AlmResult<&'a XmlElement> {
    returns(body, operation)
        .into_iter()
        .next()
        .ok_or_else(|| AlmError::Protocol(format!("{operation} returned no value")))
}

fn is_unresolvable(element: &XmlElement) -> bool {
    element.attr("unresolvable") == Some("true")
}

/// Polarion adapter.
pub struct PolarionAdapter {
    config: AdapterConfig,
    settings: ClientSettings,
    client: RwLock<Option<Arc<PolarionClient>>>,
}

impl PolarionAdapter {
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

    async fn client(&self) -> AlmResult<Arc<PolarionClient>> {
        self.client.read().await.clone().ok_or_else(|| {
            AlmError::Configuration("Polarion adapter not initialized".to_string())
        })
    }

    async fn try_initialize(&self) -> AlmResult<()> {
        self.config
            .validate_required(AdapterKind::Polarion.required_keys())?;
        let client = PolarionClient::new(&self.config, &self.settings)?;
        client.connect().await?;
        *self.client.write().await = Some(Arc::new(client));
        Ok(())
    }

    fn uri_for(item_id: &str, project: &ProjectConfig) -> AlmResult<String> {
        if is_uri(item_id) {
            return Ok(item_id.to_string());
        }
        Ok(work_item_uri(project.require_project()?, item_id))
    }

    async fn fetch_work_item(&self, item_id: &str, project: &ProjectConfig) -> AlmResult<XmlElement> {
        let uri = Self::uri_for(item_id, project)?;
        let body = self
            .client()
            .await?
            .call(
                Service::Tracker,
                "getWorkItemByUri",
                &[Node::text("uri", uri)],
            )
            .await?;
        match returns(&body, "getWorkItemByUri").into_iter().next() {
            Some(item) if !is_unresolvable(item) => Ok(item.clone()),
            _ => Err(AlmError::NotFound(format!("work item {item_id}"))),
        }
    }

    async fn list_projects(&self) -> AlmResult<Vec<Value>> {
        let body = self
            .client()
            .await?
            .call(Service::Project, "getProjects", &[])
            .await?;
        Ok(returns(&body, "getProjects")
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.child_text("id").or_else(|| p.attr("id")),
                    "name": p.child_text("name"),
                    "description": p.child_text("description"),
                })
            })
            .collect())
    }

    async fn try_test_connection(&self) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let projects = self.list_projects().await?;
        let mut data = single("connection_status", "connected");
        data.insert("server".to_string(), json!(client.server_url()));
        data.insert("projects_count".to_string(), json!(projects.len()));
        Ok(data)
    }

    async fn validate_project(&self, client: &PolarionClient, project_id: &str) -> AlmResult<()> {
        let body = client
            .call(
                Service::Project,
                "getProject",
                &[Node::text("projectId", project_id)],
            )
            .await?;
        match returns(&body, "getProject").into_iter().next() {
            Some(project) if !is_unresolvable(project) => Ok(()),
            _ => Err(AlmError::NotFound(format!("Polarion project '{project_id}'"))),
        }
    }

    async fn try_create(
        &self,
        item_type: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let project_id = project.require_project()?;
        let payload = transport::prepare_payload(data, project)?;

        let body = client
            .call_create(
                Service::Tracker,
                "createWorkItem",
                &[
                    Node::text("projectId", project_id),
                    Node::parent("workItem", work_item_nodes(&payload, Some(item_type))),
                ],
            )
            .await?;
        let uri = single_return(&body, "createWorkItem")?.text.clone();
        if uri.is_empty() {
            return Err(AlmError::Protocol(
                "createWorkItem returned an empty URI".to_string(),
            ));
        }
        let id = id_from_uri(&uri).to_string();
        info!(id = %id, project = project_id, "Created Polarion work item");

        let mut out = single("item_id", id);
        out.insert("uri".to_string(), json!(uri));
        Ok(out)
    }

    async fn try_update(
        &self,
        item_id: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let uri = Self::uri_for(item_id, project)?;
        let payload = transport::prepare_payload(data, project)?;
        if !payload.is_empty() {
            client
                .call(
                    Service::Tracker,
                    "updateWorkItem",
                    &[
                        Node::text("workItemURI", uri),
                        Node::parent("workItem", work_item_nodes(&payload, None)),
                    ],
                )
                .await?;
        }
        let mut out = single("item_id", item_id);
        out.insert(
            "updated_fields".to_string(),
            transport::field_names(&payload),
        );
        Ok(out)
    }

    async fn try_delete(&self, item_id: &str, project: &ProjectConfig) -> AlmResult<Map<String, Value>> {
        let uri = Self::uri_for(item_id, project)?;
        self.client()
            .await?
            .call(
                Service::Tracker,
                "deleteWorkItem",
                &[Node::text("workItemURI", uri)],
            )
            .await?;
        Ok(single("item_id", item_id))
    }

    async fn try_query(
        &self,
        query: &ItemQuery,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let client = self.client().await?;
        let lucene = build_lucene(project.require_project()?, query);
        let limit = query.limit(self.max_results());

        let mut args = vec![Node::text("query", lucene.as_str()), Node::text("sort", "id")];
        args.extend(QUERY_FIELDS.iter().map(|f| Node::text("fields", *f)));
        args.push(Node::text("limit", limit.to_string()));

        let body = client
            .call(Service::Tracker, "queryWorkItemsLimited", &args)
            .await?;
        let items: Vec<Value> = returns(&body, "queryWorkItemsLimited")
            .into_iter()
            .filter(|item| !is_unresolvable(item))
            .take(limit)
            .map(summary_view)
            .collect();

        let mut out = Map::new();
        out.insert("total".to_string(), json!(items.len()));
        out.insert("items".to_string(), Value::Array(items));
        out.insert("query".to_string(), json!(lucene));
        Ok(out)
    }

    async fn try_item_types(&self, project: &ProjectConfig) -> AlmResult<Map<String, Value>> {
        let body = self
            .client()
            .await?
            .call(
                Service::Tracker,
                "getAllWorkItemTypes",
                &[Node::text("projectId", project.require_project()?)],
            )
            .await?;
        let types = returns(&body, "getAllWorkItemTypes")
            .into_iter()
            .map(|t| {
                json!({
                    "id": t.child_text("id"),
                    "name": t.child_text("name").or_else(|| t.child_text("id")),
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
        let body = self
            .client()
            .await?
            .call(
                Service::Tracker,
                "getDefinedCustomFieldKeys",
                &[
                    Node::text("projectId", project.require_project()?),
                    Node::text("workItemType", item_type),
                ],
            )
            .await?;

        let mut fields: Vec<Value> = BUILTIN_FIELDS
            .iter()
            .map(|(name, kind, required)| {
                json!({ "name": name, "type": kind, "required": required, "custom": false })
            })
            .collect();
        fields.extend(
            returns(&body, "getDefinedCustomFieldKeys")
                .into_iter()
                .filter(|k| !k.text.is_empty())
                .map(|k| json!({ "name": k.text, "type": "custom", "required": false, "custom": true })),
        );
        Ok(single("fields", Value::Array(fields)))
    }

    async fn try_workflows(
        &self,
        item_type: &str,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let body = self
            .client()
            .await?
            .call(
                Service::Tracker,
                "getEnumOptionsForKey",
                &[
                    Node::text("projectId", project.require_project()?),
                    Node::text("enumKey", "status"),
                ],
            )
            .await?;
        let states = returns(&body, "getEnumOptionsForKey")
            .into_iter()
            .map(|s| {
                json!({
                    "id": s.child_text("id"),
                    "name": s.child_text("name").or_else(|| s.child_text("id")),
                    "item_type": item_type,
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
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let source = Self::uri_for(source_id, project)?;
        let target = Self::uri_for(target_id, project)?;
        let body = self
            .client()
            .await?
            .call(
                Service::Tracker,
                "addLinkedItem",
                &[
                    Node::text("workItemURI", source),
                    Node::text("linkedWorkItemURI", target),
                    Node::enum_id("role", link_type),
                ],
            )
            .await?;
        if returns(&body, "addLinkedItem")
            .first()
            .is_some_and(|r| r.text.trim() == "false")
        {
            return Err(AlmError::Validation(format!(
                "Polarion refused link {source_id} -[{link_type}]-> {target_id}"
            )));
        }
        let mut out = single("source_id", source_id);
        out.insert("target_id".to_string(), json!(target_id));
        out.insert("link_type".to_string(), json!(link_type));
        Ok(out)
    }

    async fn try_upload(
        &self,
        item_id: &str,
        content: &[u8],
        filename: &str,
        project: &ProjectConfig,
    ) -> AlmResult<Map<String, Value>> {
        let uri = Self::uri_for(item_id, project)?;
        let body = self
            .client()
            .await?
            .call_create(
                Service::Tracker,
                "createAttachment",
                &[
                    Node::text("workItemURI", uri),
                    Node::text("fileName", filename),
                    Node::text("title", filename),
                    Node::text("data", STANDARD.encode(content)),
                ],
            )
            .await?;
        let attachment_id = returns(&body, "createAttachment")
            .first()
            .map(|r| r.text.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| filename.to_string());

        let mut out = single("attachment_id", attachment_id);
        out.insert("filename".to_string(), json!(filename));
        out.insert("size".to_string(), json!(content.len()));
        Ok(out)
    }
}

#[async_trait]
impl AlmAdapter for PolarionAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Polarion
    }

    fn name(&self) -> &str {
        AdapterKind::Polarion.display_name()
    }

    fn get_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            kind: self.kind(),
            endpoint: self
                .config
                .get_str("server_url")
                .unwrap_or_default()
                .to_string(),
            api_version: API_VERSION.to_string(),
            capabilities: CAPABILITIES.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    async fn initialize(&self) -> bool {
        if let Err(err) = self.try_initialize().await {
            error!(adapter = self.name(), error = %err, "Adapter initialization failed");
            return false;
        }
        if !self.test_connection().await.success {
            if let Some(client) = self.client.write().await.take() {
                if let Err(err) = client.disconnect().await {
                    warn!(adapter = self.name(), error = %err, "Logout after failed connection test failed");
                }
            }
            return false;
        }
        info!(adapter = self.name(), "Adapter initialized");
        true
    }

    async fn test_connection(&self) -> OperationResult {
        transport::envelope(
            self.name(),
            "connect to Polarion",
            self.try_test_connection().await,
        )
    }

    async fn health_check(&self) -> HealthReport {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => return HealthReport::unhealthy(err.to_string()),
        };
        match self.list_projects().await {
            Ok(projects) => {
                let mut details = single("server", client.server_url());
                details.insert("session".to_string(), json!(client.session_label().await));
                details.insert("projects_count".to_string(), json!(projects.len()));
                HealthReport::healthy(details)
            }
            Err(err) => {
                let mut report = HealthReport::unhealthy(err.to_string());
                report
                    .details
                    .insert("session".to_string(), json!(client.session_label().await));
                report
            }
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
        let Some(target) = sync_config.project() else {
            return SyncResult::aborted(
                AlmError::Validation("Polarion project not specified in sync config".to_string())
                    .to_string(),
            );
        };
        if let Err(err) = self.validate_project(&client, target).await {
            error!(adapter = self.name(), project = target, error = %err, "Project validation failed");
            return SyncResult::aborted(format!("Failed to validate project: {err}"));
        }

        info!(
            adapter = self.name(),
            project_id,
            project = target,
            records = records.len(),
            "Starting Polarion sync"
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

    async fn get_item(&self, item_id: &str, project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let item = self.fetch_work_item(item_id, project).await?;
            Ok(single("item", work_item_view(&item)))
        }
        .await;
        transport::envelope(self.name(), "get item", result)
    }

    async fn delete_item(&self, item_id: &str, project: &ProjectConfig) -> OperationResult {
        transport::envelope(
            self.name(),
            "delete item",
            self.try_delete(item_id, project).await,
        )
    }

    async fn query_items(&self, query: &ItemQuery, project: &ProjectConfig) -> OperationResult {
        transport::envelope(
            self.name(),
            "query items",
            self.try_query(query, project).await,
        )
    }

    async fn get_projects(&self) -> OperationResult {
        let result = self
            .list_projects()
            .await
            .map(|projects| single("projects", Value::Array(projects)));
        transport::envelope(self.name(), "get projects", result)
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
        project: &ProjectConfig,
    ) -> OperationResult {
        transport::envelope(
            self.name(),
            "create link",
            self.try_link(source_id, target_id, link_type, project).await,
        )
    }

    async fn get_links(&self, item_id: &str, project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let item = self.fetch_work_item(item_id, project).await?;
            Ok(single("links", Value::Array(links(&item))))
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

    async fn get_attachments(&self, item_id: &str, project: &ProjectConfig) -> OperationResult {
        let result: AlmResult<Map<String, Value>> = async {
            let item = self.fetch_work_item(item_id, project).await?;
            Ok(single("attachments", Value::Array(attachments(&item))))
        }
        .await;
        transport::envelope(self.name(), "get attachments", result)
    }

    async fn cleanup(&self) -> AlmResult<()> {
        let client = self.client.write().await.take();
        match client {
            Some(client) => client.disconnect().await,
            None => Ok(()),
        }
    }
}
