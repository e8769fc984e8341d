//! Implementation of the `almsync sync` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use comfy_table::Cell;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::cli::types::SyncArgs;
use crate::domain::models::{AdapterKind, SyncConfig, SyncResult, WorkItemRecord};
use crate::services::AdapterRegistry;

#[derive(Debug, Serialize)]
pub struct SyncOutput {
    pub backend: AdapterKind,
    pub records: usize,
    #[serde(flatten)]
    pub result: SyncResult,
}

impl CommandOutput for SyncOutput {
    fn to_human(&self) -> String {
        if let Some(err) = &self.result.batch_error {
            return format!("Sync to {} aborted: {err}", self.backend);
        }
        let mut lines = vec![format!(
            "Synced {}/{} records to {} ({} created, {} updated, {} unchanged)",
            self.result.synced_items,
            self.records,
            self.backend,
            self.result.created_items,
            self.result.updated_items,
            self.result
                .synced_items
                .saturating_sub(self.result.created_items + self.result.updated_items),
        )];
        if !self.result.errors.is_empty() {
            let mut table = list_table(&["record", "error"]);
            for item in &self.result.errors {
                table.add_row(vec![Cell::new(&item.req_id), Cell::new(truncate(&item.error, 100))]);
            }
            lines.push(format!("{} failed:\n{table}", self.result.errors.len()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

async fn read_records(path: &Path) -> Result<Vec<WorkItemRecord>> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid records file {}", path.display()))
}

async fn read_sync_config(path: &Path) -> Result<SyncConfig> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read sync config from {}", path.display()))?;
    // Accepts JSON too.
    serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid sync config {}", path.display()))
}

pub async fn execute(registry: &AdapterRegistry, args: SyncArgs, json: bool) -> Result<ExitCode> {
    let mut records = read_records(&args.records).await?;
    let sync_config = read_sync_config(&args.sync_config).await?;

    let result = registry
        .sync_project(args.backend, &args.project_id, &sync_config, &mut records)
        .await;

    if args.write_back && result.batch_error.is_none() {
        let body = serde_json::to_string_pretty(&records)?;
        fs::write(&args.records, body)
            .await
            .with_context(|| format!("Failed to write records to {}", args.records.display()))?;
        info!(path = %args.records.display(), "Records updated with external references");
    }

    let clean = result.is_clean();
    output(
        &SyncOutput {
            backend: args.backend,
            records: records.len(),
            result,
        },
        json,
    );
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_inputs() {
        let dir = TempDir::new().unwrap();
        let records = dir.path().join("records.json");
        let config = dir.path().join("sync.yaml");
        fs::write(
            &records,
            r#"[{"req_id": "REQ-1", "title": "Login", "text": "Users log in"}]"#,
        )
        .await
        .unwrap();
        fs::write(&config, "project: MED\nitem_type: Story\n").await.unwrap();

        let records = read_records(&records).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].req_id, "REQ-1");

        let config = read_sync_config(&config).await.unwrap();
        assert_eq!(config.project(), Some("MED"));
        assert_eq!(config.item_type.as_deref(), Some("Story"));
    }

    #[test]
    fn test_human_summary_counts_unchanged() {
        let out = SyncOutput {
            backend: AdapterKind::Jira,
            records: 3,
            result: SyncResult {
                synced_items: 3,
                created_items: 1,
                updated_items: 1,
                ..SyncResult::default()
            },
        };
        assert_eq!(
            out.to_human(),
            "Synced 3/3 records to jira (1 created, 1 updated, 1 unchanged)"
        );
    }
}
