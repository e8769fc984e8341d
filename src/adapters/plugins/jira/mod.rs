//! Jira backend (REST/JSON).
//!
//! - `client`: typed HTTP client over `/rest/api/{version}`
//! - `models`: issue payloads, dotted-path expansion and JQL compilation
//! - `adapter`: the [`AlmAdapter`](crate::domain::ports::AlmAdapter) implementation

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::JiraAdapter;
pub use client::JiraClient;
