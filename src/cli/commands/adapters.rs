//! Implementation of the `almsync adapters` command.

use std::process::ExitCode;

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::output::{list_table, output, render_list, CommandOutput};
use crate::domain::models::AdapterInfo;
use crate::services::AdapterRegistry;

#[derive(Debug, Serialize)]
pub struct AdapterListOutput {
    pub adapters: Vec<AdapterInfo>,
}

impl CommandOutput for AdapterListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["backend", "name", "endpoint", "api", "capabilities"]);
        for info in &self.adapters {
            table.add_row(vec![
                Cell::new(info.kind.as_str()),
                Cell::new(&info.name),
                Cell::new(&info.endpoint),
                Cell::new(&info.api_version),
                Cell::new(info.capabilities.len()),
            ]);
        }
        render_list("adapter", &table, self.adapters.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(registry: &AdapterRegistry, json: bool) -> Result<ExitCode> {
    output(
        &AdapterListOutput {
            adapters: registry.adapter_info(),
        },
        json,
    );
    Ok(ExitCode::SUCCESS)
}
