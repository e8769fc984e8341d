//! ALM adapter port.
//!
//! Every backend adapter implements [`AlmAdapter`]. The registry and the
//! reconciliation engine only ever talk to backends through this trait, so
//! no code outside the adapter factory branches on the backend kind.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::errors::AlmResult;
use crate::domain::models::{
    AdapterInfo, AdapterKind, HealthReport, ItemQuery, OperationResult, ProjectConfig,
    SyncConfig, SyncResult, WorkItemRecord,
};

/// Uniform capability surface of an ALM backend.
///
/// Operations never return `Err`: failures are reported through the
/// [`OperationResult`] envelope, through an unhealthy [`HealthReport`], or
/// through [`SyncResult::batch_error`] and per-record errors.
#[async_trait]
pub trait AlmAdapter: Send + Sync {
    /// Backend kind this adapter serves.
    fn kind(&self) -> AdapterKind;

    /// Human-readable adapter name, used as the envelope's `adapter` field.
    fn name(&self) -> &str;

    /// Static adapter description. Never includes credentials.
    fn get_info(&self) -> AdapterInfo;

    /// Validate configuration, set up the transport and run one connection
    /// test. Returns false (after logging) on any failure.
    async fn initialize(&self) -> bool;

    /// Check that the backend is reachable with the configured credentials.
    async fn test_connection(&self) -> OperationResult;

    /// Probe backend health.
    async fn health_check(&self) -> HealthReport;

    /// Reconcile `records` against the project named in `sync_config`.
    ///
    /// Records are processed in order. Each successfully written record gets
    /// its external reference attached or refreshed in place.
    async fn sync_project(
        &self,
        project_id: &str,
        sync_config: &SyncConfig,
        records: &mut [WorkItemRecord],
    ) -> SyncResult;

    /// Create a remote item. Returns `item_id` (and `uri` when known).
    async fn create_item(
        &self,
        item_type: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> OperationResult;

    /// Update a remote item. Returns `updated_fields`.
    async fn update_item(
        &self,
        item_id: &str,
        data: &Map<String, Value>,
        project: &ProjectConfig,
    ) -> OperationResult;

    /// Fetch one item. Returns `item`.
    async fn get_item(&self, item_id: &str, project: &ProjectConfig) -> OperationResult;

    /// Delete one item.
    async fn delete_item(&self, item_id: &str, project: &ProjectConfig) -> OperationResult;

    /// Run a structured query. Returns `items` and `total`.
    async fn query_items(&self, query: &ItemQuery, project: &ProjectConfig) -> OperationResult;

    /// List projects visible to the configured account. Returns `projects`.
    async fn get_projects(&self) -> OperationResult;

    /// List item types of a project. Returns `item_types`.
    async fn get_item_types(&self, project: &ProjectConfig) -> OperationResult;

    /// List fields of an item type. Returns `fields`.
    async fn get_fields(&self, item_type: &str, project: &ProjectConfig) -> OperationResult;

    /// List workflow states of an item type. Returns `workflows`.
    async fn get_workflows(&self, item_type: &str, project: &ProjectConfig) -> OperationResult;

    /// Link two items. Returns `link_id` when the backend assigns one.
    async fn create_link(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: &str,
        project: &ProjectConfig,
    ) -> OperationResult;

    /// List links of an item. Returns `links`.
    async fn get_links(&self, item_id: &str, project: &ProjectConfig) -> OperationResult;

    /// Attach a file to an item. Returns `attachment_id`.
    async fn upload_attachment(
        &self,
        item_id: &str,
        content: &[u8],
        filename: &str,
        project: &ProjectConfig,
    ) -> OperationResult;

    /// List attachments of an item. Returns `attachments`.
    async fn get_attachments(&self, item_id: &str, project: &ProjectConfig) -> OperationResult;

    /// Release the transport and any remote session.
    async fn cleanup(&self) -> AlmResult<()>;
}
