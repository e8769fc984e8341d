pub mod adapter;
pub mod config;
pub mod envelope;
pub mod field_mapping;
pub mod project;
pub mod sync;
pub mod work_item;

pub use adapter::{AdapterConfig, AdapterInfo, AdapterKind, HealthReport, HealthStatus};
pub use config::{
    BackendSettings, BackendsConfig, Config, HttpConfig, LoggingConfig, RetryConfig,
    SecretsConfig,
};
pub use envelope::OperationResult;
pub use field_mapping::{FieldMapping, FieldTarget, MappingEntry, Transform};
pub use project::{ItemQuery, ProjectConfig};
pub use sync::{ItemError, SyncConfig, SyncResult};
pub use work_item::{ExternalReference, WorkItemRecord};
