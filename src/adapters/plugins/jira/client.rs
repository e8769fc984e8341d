//! Jira REST client.
//!
//! Thin typed wrapper over `/rest/api/{version}`. Every round-trip goes
//! through the configured [`RetryPolicy`]; HTTP failures are classified by
//! [`transport::ensure_success`].

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};

use super::models::{CreatedIssue, JiraIssue, SearchResponse};
use crate::adapters::plugins::transport::{self, ClientSettings};
use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::AdapterConfig;
use crate::infrastructure::retry::RetryPolicy;

/// Default REST API version.
pub const DEFAULT_API_VERSION: &str = "2";

/// HTTP client for one Jira server.
#[derive(Clone)]
pub struct JiraClient {
    http: Client,
    server: String,
    api_base: String,
    username: String,
    api_token: String,
    retry: RetryPolicy,
}

impl JiraClient {
    /// Build a client from validated connection parameters.
    pub fn new(config: &AdapterConfig, settings: &ClientSettings) -> AlmResult<Self> {
        let server = transport::normalize_base_url(config.require("server")?, "server")?;
        let api_version = config.get_str("api_version").unwrap_or(DEFAULT_API_VERSION);
        Ok(Self {
            http: transport::build_http_client(settings, config)?,
            api_base: format!("{server}/rest/api/{api_version}"),
            server,
            username: config.require("username")?.to_string(),
            api_token: config.require("api_token")?.to_string(),
            retry: settings.retry,
        })
    }

    /// Server root URL.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Browse URL of an issue.
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.server)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> AlmResult<Value> {
        self.request_with(self.retry, method, path, query, body)
            .await
    }

    async fn request_with(
        &self,
        retry: RetryPolicy,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> AlmResult<Value> {
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        let url = url.as_str();
        let method = &method;
        retry
            .execute(move || async move {
                let mut req = self
                    .http
                    .request(method.clone(), url)
                    .basic_auth(&self.username, Some(&self.api_token))
                    .header("Accept", "application/json")
                    .query(query);
                if let Some(body) = body {
                    req = req.json(body);
                }
                let resp = transport::ensure_success(req.send().await?).await?;
                transport::read_json(resp).await
            })
            .await
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> AlmResult<Value> {
        self.request(Method::GET, path, query, None).await
    }

    /// `GET /serverInfo`.
    pub async fn server_info(&self) -> AlmResult<Value> {
        self.get("serverInfo", &[]).await
    }

    /// `GET /myself`.
    pub async fn myself(&self) -> AlmResult<Value> {
        self.get("myself", &[]).await
    }

    /// `GET /project`.
    pub async fn projects(&self) -> AlmResult<Vec<Value>> {
        match self.get("project", &[]).await? {
            Value::Array(items) => Ok(items),
            other => Err(unexpected("project list", &other)),
        }
    }

    /// `GET /project/{key}`.
    pub async fn project(&self, key: &str) -> AlmResult<Value> {
        self.get(&format!("project/{}", urlencoding::encode(key)), &[])
            .await
    }

    /// `GET /project/{key}/statuses`: statuses grouped by issue type.
    pub async fn project_statuses(&self, key: &str) -> AlmResult<Vec<Value>> {
        match self
            .get(&format!("project/{}/statuses", urlencoding::encode(key)), &[])
            .await?
        {
            Value::Array(items) => Ok(items),
            other => Err(unexpected("status list", &other)),
        }
    }

    /// `GET /field`.
    pub async fn fields(&self) -> AlmResult<Vec<Value>> {
        match self.get("field", &[]).await? {
            Value::Array(items) => Ok(items),
            other => Err(unexpected("field list", &other)),
        }
    }

    /// `POST /issue`.
    pub async fn create_issue(&self, fields: Map<String, Value>) -> AlmResult<CreatedIssue> {
        let body = json!({ "fields": fields });
        let value = self
            .request_with(self.retry.for_create(), Method::POST, "issue", &[], Some(&body))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `PUT /issue/{key}`.
    pub async fn update_issue(&self, key: &str, fields: Map<String, Value>) -> AlmResult<()> {
        let body = json!({ "fields": fields });
        self.request(
            Method::PUT,
            &format!("issue/{}", urlencoding::encode(key)),
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// `GET /issue/{key}`, optionally restricted to `fields`.
    pub async fn issue(&self, key: &str, fields: Option<&str>) -> AlmResult<JiraIssue> {
        let query: Vec<(&str, String)> = fields
            .map(|f| vec![("fields", f.to_string())])
            .unwrap_or_default();
        let value = self
            .get(&format!("issue/{}", urlencoding::encode(key)), &query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `DELETE /issue/{key}`.
    pub async fn delete_issue(&self, key: &str) -> AlmResult<()> {
        self.request(
            Method::DELETE,
            &format!("issue/{}", urlencoding::encode(key)),
            &[],
            None,
        )
        .await?;
        Ok(())
    }

    /// `POST /search`: one page of results.
    pub async fn search(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
    ) -> AlmResult<SearchResponse> {
        let body = json!({
            "jql": jql,
            "startAt": start_at,
            "maxResults": max_results,
            "fields": ["summary", "status", "issuetype", "created", "updated"],
        });
        let value = self.request(Method::POST, "search", &[], Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST /issueLink`.
    pub async fn create_link(&self, link_type: &str, inward: &str, outward: &str) -> AlmResult<()> {
        let body = json!({
            "type": { "name": link_type },
            "inwardIssue": { "key": inward },
            "outwardIssue": { "key": outward },
        });
        self.request_with(
            self.retry.for_create(),
            Method::POST,
            "issueLink",
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// `POST /issue/{key}/attachments` (multipart).
    pub async fn add_attachment(
        &self,
        key: &str,
        content: &[u8],
        filename: &str,
    ) -> AlmResult<Vec<Value>> {
        let url = format!(
            "{}/issue/{}/attachments",
            self.api_base,
            urlencoding::encode(key)
        );
        let url = url.as_str();
        let value = self
            .retry
            .for_create()
            .execute(move || async move {
                // Multipart bodies are consumed on send, so each attempt builds its own.
                let form = Form::new().part(
                    "file",
                    Part::bytes(content.to_vec()).file_name(filename.to_string()),
                );
                let resp = self
                    .http
                    .post(url)
                    .basic_auth(&self.username, Some(&self.api_token))
                    .header("X-Atlassian-Token", "no-check")
                    .multipart(form)
                    .send()
                    .await?;
                let resp = transport::ensure_success(resp).await?;
                transport::read_json(resp).await
            })
            .await?;
        match value {
            Value::Array(items) => Ok(items),
            other => Err(unexpected("attachment list", &other)),
        }
    }
}

fn unexpected(what: &str, value: &Value) -> AlmError {
    AlmError::Protocol(format!(
        "expected {what}, got {}",
        crate::domain::models::adapter::json_type_name(value)
    ))
}
