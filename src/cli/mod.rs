//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

use std::path::Path;
use std::process::ExitCode;

pub use types::{Cli, Commands};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Load configuration from `path`, or hierarchically from `.almsync/`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Report a command error and return the failure exit code.
pub fn handle_error(err: &anyhow::Error, json: bool) -> ExitCode {
    if json {
        let body = serde_json::json!({ "success": false, "error": format!("{err:#}") });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    ExitCode::FAILURE
}
