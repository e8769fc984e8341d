//! Reconciliation engine.
//!
//! Decides per record whether to create, update or leave the remote
//! counterpart alone, and drives the adapter accordingly. The baseline for
//! change detection is the mapped payload stored on the record's
//! [`ExternalReference`] at the last successful write; the engine never
//! re-fetches remote items to make that decision.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::errors::{AlmError, AlmResult};
use crate::domain::models::{
    AdapterKind, ExternalReference, FieldMapping, OperationResult, ProjectConfig, SyncConfig,
    SyncResult, WorkItemRecord,
};
use crate::domain::ports::AlmAdapter;
use crate::services::field_mapper::{changed_fields, map_record};

/// What to do with one record.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// No remote counterpart yet; create it with the full payload.
    Create {
        /// Full mapped payload.
        payload: Map<String, Value>,
    },
    /// Remote counterpart exists and some mapped fields changed.
    Update {
        /// Remote identifier.
        remote_id: String,
        /// Only the fields that differ from the baseline.
        changed: Map<String, Value>,
        /// Full mapped payload, stored as the next baseline.
        payload: Map<String, Value>,
    },
    /// Remote counterpart is up to date.
    Unchanged,
}

/// Decide what to do with `record` when syncing to `backend`.
///
/// The payload is built by [`map_record`], so title and text are written
/// even when `mapping` is empty. A record linked to a different backend is rejected; moving it requires
/// [`WorkItemRecord::remap`].
pub fn plan(
    record: &WorkItemRecord,
    backend: AdapterKind,
    mapping: &FieldMapping,
) -> AlmResult<SyncAction> {
    let payload = map_record(&record.source_attributes(), backend, mapping);

    match &record.external_ref {
        None => {
            if payload.is_empty() {
                return Err(AlmError::Validation(
                    "record has no title, text or mapped attribute to write".to_string(),
                ));
            }
            Ok(SyncAction::Create { payload })
        }
        Some(reference) if reference.backend != backend => Err(AlmError::Validation(format!(
            "record is linked to {} item {}; explicit remap required",
            reference.backend, reference.remote_id
        ))),
        Some(reference) => {
            let changed = changed_fields(&payload, &reference.synced_fields);
            if changed.is_empty() {
                Ok(SyncAction::Unchanged)
            } else {
                Ok(SyncAction::Update {
                    remote_id: reference.remote_id.clone(),
                    changed,
                    payload,
                })
            }
        }
    }
}

/// Outcome of syncing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Sync `records` through `adapter`, strictly in input order.
///
/// One record's failure becomes an error entry and never stops the batch.
/// The caller is responsible for checking that the target project exists.
pub async fn sync_batch(
    adapter: &dyn AlmAdapter,
    sync_config: &SyncConfig,
    item_type: &str,
    records: &mut [WorkItemRecord],
) -> SyncResult {
    let Some(project) = sync_config.project() else {
        return SyncResult::aborted(
            AlmError::Validation("target project not specified in sync config".to_string())
                .to_string(),
        );
    };
    if let Err(err) = sync_config.field_mapping.validate() {
        return SyncResult::aborted(err.to_string());
    }

    let project_config = ProjectConfig::for_project(project);
    let mut result = SyncResult::default();

    for record in records.iter_mut() {
        match sync_record(adapter, sync_config, item_type, &project_config, record).await {
            Ok(outcome) => {
                result.synced_items += 1;
                match outcome {
                    RecordOutcome::Created => result.created_items += 1,
                    RecordOutcome::Updated => result.updated_items += 1,
                    RecordOutcome::Unchanged => {}
                }
            }
            Err(err) => {
                warn!(
                    adapter = adapter.name(),
                    req_id = %record.req_id,
                    error = %err,
                    "Record sync failed"
                );
                result.push_error(record.req_id.clone(), err);
            }
        }
    }

    info!(
        adapter = adapter.name(),
        project = project,
        synced = result.synced_items,
        created = result.created_items,
        updated = result.updated_items,
        failed = result.errors.len(),
        "Batch sync finished"
    );
    result
}

async fn sync_record(
    adapter: &dyn AlmAdapter,
    sync_config: &SyncConfig,
    item_type: &str,
    project_config: &ProjectConfig,
    record: &mut WorkItemRecord,
) -> Result<RecordOutcome, String> {
    let action = plan(record, adapter.kind(), &sync_config.field_mapping)
        .map_err(|err| err.to_string())?;
    match action {
        SyncAction::Create { payload } => {
            let response = adapter
                .create_item(item_type, &payload, project_config)
                .await;
            if !response.success {
                return Err(failure_message(&response));
            }
            let remote_id = response
                .item_id()
                .ok_or_else(|| "create succeeded without returning an item id".to_string())?;

            let mut reference = ExternalReference::new(adapter.kind(), remote_id)
                .with_synced_fields(payload);
            reference.uri = response.get_str("uri").map(str::to_string);
            reference.synced_at = Some(Utc::now());

            info!(
                adapter = adapter.name(),
                req_id = %record.req_id,
                remote_id = %reference.remote_id,
                "Created remote item"
            );
            record.external_ref = Some(reference);
            Ok(RecordOutcome::Created)
        }
        SyncAction::Update {
            remote_id,
            changed,
            payload,
        } => {
            let response = adapter
                .update_item(&remote_id, &changed, project_config)
                .await;
            if !response.success {
                return Err(failure_message(&response));
            }
            if let Some(reference) = record.external_ref.as_mut() {
                reference.synced_fields = payload;
                reference.synced_at = Some(Utc::now());
            }

            // The backend may have already held these values.
            let remote_changed = response
                .get("updated_fields")
                .and_then(Value::as_array)
                .is_none_or(|fields| !fields.is_empty());
            debug!(
                adapter = adapter.name(),
                req_id = %record.req_id,
                remote_id = %remote_id,
                fields = changed.len(),
                "Updated remote item"
            );
            Ok(if remote_changed {
                RecordOutcome::Updated
            } else {
                RecordOutcome::Unchanged
            })
        }
        SyncAction::Unchanged => {
            debug!(req_id = %record.req_id, "Record unchanged, skipping");
            Ok(RecordOutcome::Unchanged)
        }
    }
}

fn failure_message(response: &OperationResult) -> String {
    match response.error_message() {
        "" => format!("{} reported failure without a message", response.adapter),
        message => message.to_string(),
    }
}
