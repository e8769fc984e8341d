//! Implementation of the `almsync health` command.

use std::process::ExitCode;

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::output::{cell_text, list_table, output, truncate, CommandOutput};
use crate::domain::models::HealthStatus;
use crate::services::AdapterRegistry;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct HealthOutput(pub HealthStatus);

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        let status = &self.0;
        if status.adapters.is_empty() {
            return "No adapters configured.".to_string();
        }
        let mut table = list_table(&["backend", "status", "details"]);
        for (backend, report) in &status.adapters {
            let details = report
                .details
                .iter()
                .map(|(k, v)| format!("{k}={}", cell_text(Some(v))))
                .collect::<Vec<_>>()
                .join(" ");
            table.add_row(vec![
                Cell::new(backend),
                Cell::new(if report.healthy { "healthy" } else { "unhealthy" }),
                Cell::new(truncate(&details, 80)),
            ]);
        }
        let overall = if status.overall_healthy {
            "healthy"
        } else {
            "UNHEALTHY"
        };
        format!("Overall: {overall}\n{table}")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(registry: &AdapterRegistry, json: bool) -> Result<ExitCode> {
    let status = registry.get_health_status().await;
    let healthy = status.overall_healthy;
    output(&HealthOutput(status), json);
    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
