//! Polarion SOAP client with an owned login session.
//!
//! Every call takes the session lock, logs in when there is no live
//! session, and re-logs in once when the server rejects the token.

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::SessionState;
use super::soap::{build_envelope, parse_response, Node, Service, XmlElement};
use crate::adapters::plugins::transport::{self, ClientSettings};
use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::AdapterConfig;
use crate::infrastructure::logging::scrub;
use crate::infrastructure::retry::RetryPolicy;

/// Session lifetime assumed when `session_ttl_secs` is not configured.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

/// Longest SOAP error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// SOAP client for one Polarion server.
pub struct PolarionClient {
    http: Client,
    server_url: String,
    username: String,
    password: String,
    session_ttl: Duration,
    retry: RetryPolicy,
    session: Mutex<SessionState>,
}

impl PolarionClient {
    /// Build a client from validated connection parameters.
    pub fn new(config: &AdapterConfig, settings: &ClientSettings) -> AlmResult<Self> {
        Ok(Self {
            http: transport::build_http_client(settings, config)?,
            server_url: transport::normalize_base_url(config.require("server_url")?, "server_url")?,
            username: config.require("username")?.to_string(),
            password: config.require("password")?.to_string(),
            session_ttl: Duration::from_secs(
                config
                    .get_u64("session_ttl_secs")
                    .unwrap_or(DEFAULT_SESSION_TTL_SECS),
            ),
            retry: settings.retry,
            session: Mutex::new(SessionState::default()),
        })
    }

    /// Server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Current session state name.
    pub async fn session_label(&self) -> &'static str {
        self.session.lock().await.label()
    }

    /// POST one envelope and return the parsed SOAP body.
    async fn post(
        &self,
        retry: RetryPolicy,
        service: Service,
        envelope: &str,
    ) -> AlmResult<XmlElement> {
        let url = format!("{}{}", self.server_url, service.path());
        let url = url.as_str();
        retry
            .execute(move || async move {
                let resp = self
                    .http
                    .post(url)
                    .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                    .header("SOAPAction", "\"\"")
                    .body(envelope.to_string())
                    .send()
                    .await?;
                let status = resp.status();
                let body = resp.text().await?;
                let parsed = parse_response(&body);
                if status.is_success() {
                    return parsed;
                }
                match parsed {
                    // Faults come back as 500 with a parseable envelope.
                    Err(err @ (AlmError::Authentication(_) | AlmError::Protocol(_)))
                        if body.contains(":Fault>") || body.contains("<Fault>") =>
                    {
                        Err(err)
                    }
                    _ => {
                        let body: String =
                            scrub(body.trim()).chars().take(MAX_ERROR_BODY).collect();
                        Err(AlmError::from_status(status, body))
                    }
                }
            })
            .await
    }

    async fn log_in(&self) -> AlmResult<String> {
        let envelope = build_envelope(
            Service::Session,
            "logIn",
            None,
            &[
                Node::text("userName", &self.username),
                Node::text("password", &self.password),
            ],
        )?;
        let body = self.post(self.retry, Service::Session, &envelope).await?;
        let token = body
            .find("logInReturn")
            .or_else(|| body.find("sessionID"))
            .map(|e| e.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AlmError::Authentication("Polarion login returned no session id".to_string())
            })?;
        info!(server = %self.server_url, "Polarion session established");
        Ok(token)
    }

    /// Invoke `service.operation(args)` within the session.
    pub async fn call(
        &self,
        service: Service,
        operation: &str,
        args: &[Node],
    ) -> AlmResult<XmlElement> {
        self.call_with(self.retry, service, operation, args).await
    }

    /// Invoke an operation that creates something on the server.
    ///
    /// Faults and timeouts are not retried, since the server may already
    /// have stored the item.
    pub async fn call_create(
        &self,
        service: Service,
        operation: &str,
        args: &[Node],
    ) -> AlmResult<XmlElement> {
        self.call_with(self.retry.for_create(), service, operation, args)
            .await
    }

    async fn call_with(
        &self,
        retry: RetryPolicy,
        service: Service,
        operation: &str,
        args: &[Node],
    ) -> AlmResult<XmlElement> {
        let mut session = self.session.lock().await;

        let token = match session.token_at(Instant::now()) {
            Some(token) => token.to_string(),
            None => {
                let token = self.log_in().await?;
                session.authenticate(token.clone(), self.session_ttl, Instant::now());
                token
            }
        };

        let envelope = build_envelope(service, operation, Some(&token), args)?;
        match self.post(retry, service, &envelope).await {
            Err(AlmError::Authentication(reason)) => {
                warn!(operation, reason = %reason, "Polarion session rejected, logging in again");
                session.expire();
                let token = self.log_in().await?;
                session.authenticate(token.clone(), self.session_ttl, Instant::now());
                let envelope = build_envelope(service, operation, Some(&token), args)?;
                self.post(retry, service, &envelope).await
            }
            other => other,
        }
    }

    /// Establish a session now, replacing any existing one.
    pub async fn connect(&self) -> AlmResult<()> {
        let mut session = self.session.lock().await;
        let token = self.log_in().await?;
        session.authenticate(token, self.session_ttl, Instant::now());
        Ok(())
    }

    /// Log out and drop the session.
    pub async fn disconnect(&self) -> AlmResult<()> {
        let token = self.session.lock().await.clear();
        if let Some(token) = token {
            let envelope = build_envelope(Service::Session, "endSession", Some(&token), &[])?;
            self.post(self.retry, Service::Session, &envelope).await?;
            debug!(server = %self.server_url, "Polarion session ended");
        }
        Ok(())
    }
}
