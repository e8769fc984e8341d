//! Common test utilities for integration tests
//!
//! Adapter configs pointing at a mock server and transport settings that
//! keep retries fast.

#![allow(dead_code)]

use std::time::Duration;

use almsync::adapters::plugins::transport::ClientSettings;
use almsync::infrastructure::retry::RetryPolicy;
use almsync::{AdapterConfig, AdapterKind};
use serde_json::{Map, Value};

/// Transport settings without retries.
pub fn settings() -> ClientSettings {
    ClientSettings::default().with_retry(RetryPolicy::no_retry())
}

/// Transport settings retrying up to `attempts` times with a 1ms backoff.
pub fn retrying(attempts: u32) -> ClientSettings {
    ClientSettings::default().with_retry(RetryPolicy::new(attempts, Duration::from_millis(1)))
}

pub fn jira_config(url: &str) -> AdapterConfig {
    AdapterConfig::new()
        .with("server", url)
        .with("username", "sync-bot")
        .with("api_token", "jira-token")
}

pub fn ado_config(url: &str) -> AdapterConfig {
    AdapterConfig::new()
        .with("organization_url", format!("{url}/acme"))
        .with("personal_access_token", "ado-pat")
}

pub fn polarion_config(url: &str) -> AdapterConfig {
    AdapterConfig::new()
        .with("server_url", url)
        .with("username", "sync-bot")
        .with("password", "polarion-pass")
}

/// Config for `kind` against `url`.
pub fn config_for(kind: AdapterKind, url: &str) -> AdapterConfig {
    match kind {
        AdapterKind::Jira => jira_config(url),
        AdapterKind::AzureDevOps => ado_config(url),
        AdapterKind::Polarion => polarion_config(url),
    }
}

/// A JSON object literal as a map.
pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("JSON object")
}

/// Wrap a SOAP body in an envelope.
pub fn soap_body(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>{inner}</soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// A successful Polarion `logIn` response.
pub fn polarion_login(session_id: &str) -> String {
    soap_body(&format!(
        "<ns1:logInResponse xmlns:ns1=\"http://ws.polarion.com/SessionWebService-impl\">\
         <ns1:logInReturn>{session_id}</ns1:logInReturn></ns1:logInResponse>"
    ))
}
