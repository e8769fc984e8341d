//! Azure DevOps REST client.
//!
//! Authenticates with a personal access token (basic auth, empty user).
//! Mutations are JSON-Patch documents sent as
//! `application/json-patch+json`.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::models::{AttachmentReference, ValueList, WiqlResult, WorkItem};
use super::patch::PatchOperation;
use crate::adapters::plugins::transport::{self, ClientSettings};
use crate::domain::errors::AlmResult;
use crate::domain::models::AdapterConfig;
use crate::infrastructure::retry::RetryPolicy;

/// Default REST API version.
pub const DEFAULT_API_VERSION: &str = "7.0";

/// Most ids accepted by one batch work item request.
const MAX_BATCH_IDS: usize = 200;

const JSON_PATCH: &str = "application/json-patch+json";

/// Fields fetched for query results.
const SUMMARY_FIELDS: &str =
    "System.Id,System.Title,System.State,System.WorkItemType,System.CreatedDate,System.ChangedDate";

/// Request body variants.
#[derive(Debug, Clone, Copy)]
enum Body<'a> {
    None,
    Json(&'a Value),
    Patch(&'a [PatchOperation]),
    Bytes(&'a [u8]),
}

/// HTTP client for one Azure DevOps organization.
#[derive(Clone)]
pub struct AzureDevOpsClient {
    http: Client,
    organization_url: String,
    token: String,
    api_version: String,
    retry: RetryPolicy,
}

impl AzureDevOpsClient {
    /// Build a client from validated connection parameters.
    pub fn new(config: &AdapterConfig, settings: &ClientSettings) -> AlmResult<Self> {
        Ok(Self {
            http: transport::build_http_client(settings, config)?,
            organization_url: transport::normalize_base_url(
                config.require("organization_url")?,
                "organization_url",
            )?,
            token: config.require("personal_access_token")?.to_string(),
            api_version: config
                .get_str("api_version")
                .unwrap_or(DEFAULT_API_VERSION)
                .to_string(),
            retry: settings.retry,
        })
    }

    /// Organization URL.
    pub fn organization_url(&self) -> &str {
        &self.organization_url
    }

    /// API URL under the organization, optionally scoped to a project.
    fn url(&self, project: Option<&str>, path: &str) -> String {
        match project {
            Some(project) => format!(
                "{}/{}/_apis/{path}",
                self.organization_url,
                urlencoding::encode(project)
            ),
            None => format!("{}/_apis/{path}", self.organization_url),
        }
    }

    /// REST URL of a work item, as used in relations.
    pub fn work_item_url(&self, id: &str) -> String {
        self.url(None, &format!("wit/workItems/{id}"))
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Body<'_>,
    ) -> AlmResult<Value> {
        self.request_with(self.retry, method, url, query, body)
            .await
    }

    async fn request_with(
        &self,
        retry: RetryPolicy,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Body<'_>,
    ) -> AlmResult<Value> {
        let method = &method;
        let api_version = [("api-version", self.api_version.clone())];
        let api_version: &[(&str, String)] = &api_version;
        retry
            .execute(move || async move {
                let mut req = self
                    .http
                    .request(method.clone(), url)
                    .basic_auth("", Some(&self.token))
                    .header("Accept", "application/json")
                    .query(api_version)
                    .query(query);
                req = match body {
                    Body::None => req,
                    Body::Json(value) => req.json(value),
                    Body::Patch(ops) => req.header(CONTENT_TYPE, JSON_PATCH).json(ops),
                    Body::Bytes(bytes) => req
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .body(bytes.to_vec()),
                };
                let resp = transport::ensure_success(req.send().await?).await?;
                transport::read_json(resp).await
            })
            .await
    }

    async fn get_as<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> AlmResult<T> {
        let value = self.request(Method::GET, url, query, Body::None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `GET _apis/connectionData`.
    pub async fn connection_data(&self) -> AlmResult<Value> {
        self.get_as(&self.url(None, "connectionData"), &[]).await
    }

    /// `GET _apis/projects`.
    pub async fn projects(&self, top: Option<usize>) -> AlmResult<Vec<Value>> {
        let query: Vec<(&str, String)> = top
            .map(|n| vec![("$top", n.to_string())])
            .unwrap_or_default();
        let list: ValueList<Value> = self.get_as(&self.url(None, "projects"), &query).await?;
        Ok(list.value)
    }

    /// `GET _apis/projects/{project}`.
    pub async fn project(&self, project: &str) -> AlmResult<Value> {
        let path = format!("projects/{}", urlencoding::encode(project));
        self.get_as(&self.url(None, &path), &[]).await
    }

    /// `POST {project}/_apis/wit/workitems/${type}`.
    pub async fn create_work_item(
        &self,
        project: &str,
        item_type: &str,
        document: &[PatchOperation],
    ) -> AlmResult<WorkItem> {
        let path = format!("wit/workitems/${}", urlencoding::encode(item_type));
        let value = self
            .request_with(
                self.retry.for_create(),
                Method::POST,
                &self.url(Some(project), &path),
                &[],
                Body::Patch(document),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `PATCH _apis/wit/workitems/{id}`.
    pub async fn update_work_item(
        &self,
        id: &str,
        document: &[PatchOperation],
    ) -> AlmResult<WorkItem> {
        let value = self
            .request(
                Method::PATCH,
                &self.url(None, &format!("wit/workitems/{}", urlencoding::encode(id))),
                &[],
                Body::Patch(document),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `GET _apis/wit/workitems/{id}`, optionally with relations.
    pub async fn work_item(&self, id: &str, with_relations: bool) -> AlmResult<WorkItem> {
        let query: Vec<(&str, String)> = if with_relations {
            vec![("$expand", "relations".to_string())]
        } else {
            Vec::new()
        };
        self.get_as(
            &self.url(None, &format!("wit/workitems/{}", urlencoding::encode(id))),
            &query,
        )
        .await
    }

    /// `DELETE _apis/wit/workitems/{id}`.
    pub async fn delete_work_item(&self, id: &str) -> AlmResult<()> {
        self.request(
            Method::DELETE,
            &self.url(None, &format!("wit/workitems/{}", urlencoding::encode(id))),
            &[],
            Body::None,
        )
        .await?;
        Ok(())
    }

    /// `POST {project}/_apis/wit/wiql`: ids of matching items.
    pub async fn wiql(&self, project: &str, wiql: &str, top: usize) -> AlmResult<Vec<u64>> {
        let body = json!({ "query": wiql });
        let value = self
            .request(
                Method::POST,
                &self.url(Some(project), "wit/wiql"),
                &[("$top", top.to_string())],
                Body::Json(&body),
            )
            .await?;
        let result: WiqlResult = serde_json::from_value(value)?;
        Ok(result.work_items.into_iter().map(|r| r.id).collect())
    }

    /// `GET _apis/wit/workitems?ids=...` in batches.
    pub async fn work_items(&self, ids: &[u64]) -> AlmResult<Vec<WorkItem>> {
        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_IDS) {
            let ids = chunk
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let list: ValueList<WorkItem> = self
                .get_as(
                    &self.url(None, "wit/workitems"),
                    &[("ids", ids), ("fields", SUMMARY_FIELDS.to_string())],
                )
                .await?;
            items.extend(list.value);
        }
        Ok(items)
    }

    /// `GET {project}/_apis/wit/workitemtypes`.
    pub async fn work_item_types(&self, project: &str) -> AlmResult<Vec<Value>> {
        let list: ValueList<Value> = self
            .get_as(&self.url(Some(project), "wit/workitemtypes"), &[])
            .await?;
        Ok(list.value)
    }

    /// `GET {project}/_apis/wit/workitemtypes/{type}/fields`.
    pub async fn work_item_type_fields(&self, project: &str, item_type: &str) -> AlmResult<Vec<Value>> {
        let path = format!("wit/workitemtypes/{}/fields", urlencoding::encode(item_type));
        let list: ValueList<Value> = self.get_as(&self.url(Some(project), &path), &[]).await?;
        Ok(list.value)
    }

    /// `GET {project}/_apis/wit/workitemtypes/{type}/states`.
    pub async fn work_item_type_states(&self, project: &str, item_type: &str) -> AlmResult<Vec<Value>> {
        let path = format!("wit/workitemtypes/{}/states", urlencoding::encode(item_type));
        let list: ValueList<Value> = self.get_as(&self.url(Some(project), &path), &[]).await?;
        Ok(list.value)
    }

    /// `POST {project}/_apis/wit/attachments?fileName=...`.
    pub async fn upload_attachment(
        &self,
        project: Option<&str>,
        content: &[u8],
        filename: &str,
    ) -> AlmResult<AttachmentReference> {
        let value = self
            .request_with(
                self.retry.for_create(),
                Method::POST,
                &self.url(project, "wit/attachments"),
                &[("fileName", filename.to_string())],
                Body::Bytes(content),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}
