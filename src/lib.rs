//! almsync - ALM backend synchronization
//!
//! almsync pushes internal compliance work items (requirements, tests) to
//! external ALM backends and keeps them linked. One capability contract,
//! [`AlmAdapter`], is implemented for Jira (REST/JSON), Azure DevOps
//! (REST/JSON-Patch) and Polarion (SOAP/XML).
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, error taxonomy and the adapter/secret ports
//! - **Service Layer** (`services`): field mapping, reconciliation and the adapter registry
//! - **Adapters** (`adapters`): the three backend implementations
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, retry and secret sources
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use almsync::infrastructure::secrets::EnvSecretSource;
//! use almsync::{AdapterKind, AdapterRegistry, Config, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut registry = AdapterRegistry::default();
//!     registry.initialize(&EnvSecretSource::new(), &config.backends).await?;
//!     let mut records = Vec::new();
//!     let result = registry
//!         .sync_project(AdapterKind::Jira, "p1", &SyncConfig::new("MED"), &mut records)
//!         .await;
//!     println!("{result:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{AlmError, AlmResult};
pub use domain::models::{
    AdapterConfig, AdapterKind, Config, FieldMapping, ItemQuery, OperationResult, ProjectConfig,
    SyncConfig, SyncResult, WorkItemRecord,
};
pub use domain::ports::{AlmAdapter, SecretSource};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::AdapterRegistry;
