//! Implementation of the single-item commands: `test-connection`, `get`
//! and `query`.

use std::process::ExitCode;

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;
use serde_json::Value;

use crate::cli::output::{cell_text, list_table, output, render_list, truncate, CommandOutput};
use crate::cli::types::QueryArgs;
use crate::domain::models::{AdapterKind, ItemQuery, OperationResult, ProjectConfig};
use crate::services::AdapterRegistry;

/// An operation envelope rendered for the terminal.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct EnvelopeOutput(pub OperationResult);

impl EnvelopeOutput {
    fn exit_code(&self) -> ExitCode {
        if self.0.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

fn items_table(items: &[Value]) -> String {
    let mut table = list_table(&["id", "title", "status", "type"]);
    for item in items {
        let title = item.get("title").or_else(|| item.get("summary"));
        let status = item.get("status").or_else(|| item.get("state"));
        let kind = item
            .get("type")
            .or_else(|| item.get("issue_type"))
            .or_else(|| item.get("work_item_type"));
        table.add_row(vec![
            Cell::new(cell_text(item.get("id"))),
            Cell::new(truncate(&cell_text(title), 60)),
            Cell::new(cell_text(status)),
            Cell::new(cell_text(kind)),
        ]);
    }
    render_list("item", &table, items.len())
}

impl CommandOutput for EnvelopeOutput {
    fn to_human(&self) -> String {
        let result = &self.0;
        if !result.success {
            return format!("{}: {}", result.adapter, result.error_message());
        }
        if let Some(items) = result.get("items").and_then(Value::as_array) {
            return items_table(items);
        }
        let body = serde_json::to_string_pretty(&result.data).unwrap_or_default();
        format!("{}: ok\n{body}", result.adapter)
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn test_connection(
    registry: &AdapterRegistry,
    backend: AdapterKind,
    json: bool,
) -> Result<ExitCode> {
    let out = EnvelopeOutput(registry.test_connection(backend).await);
    output(&out, json);
    Ok(out.exit_code())
}

pub async fn get(
    registry: &AdapterRegistry,
    backend: AdapterKind,
    id: &str,
    project: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let project = ProjectConfig {
        project,
        ..ProjectConfig::default()
    };
    let out = EnvelopeOutput(registry.get_item(backend, id, &project).await);
    output(&out, json);
    Ok(out.exit_code())
}

pub async fn query(registry: &AdapterRegistry, args: QueryArgs, json: bool) -> Result<ExitCode> {
    let query = ItemQuery {
        item_type: args.item_type,
        status: args.status,
        text_search: args.text,
        max_results: args.max_results,
    };
    let project = ProjectConfig::for_project(args.project);
    let out = EnvelopeOutput(registry.query_items(args.backend, &query, &project).await);
    output(&out, json);
    Ok(out.exit_code())
}
