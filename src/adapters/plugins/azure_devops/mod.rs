//! Azure DevOps Boards backend (REST/JSON-Patch).

pub mod adapter;
pub mod client;
pub mod models;
pub mod patch;

pub use adapter::AzureDevOpsAdapter;
pub use client::AzureDevOpsClient;
