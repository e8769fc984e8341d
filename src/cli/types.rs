//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::models::AdapterKind;

#[derive(Parser, Debug)]
#[command(name = "almsync")]
#[command(about = "almsync - sync compliance work items with ALM backends", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .almsync/config.yaml)
    #[arg(short, long, global = true, env = "ALMSYNC_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List adapters that initialized successfully
    Adapters,

    /// Test the connection to one backend
    TestConnection {
        /// Backend identifier (jira, azure_devops, polarion)
        #[arg(value_parser = parse_backend)]
        backend: AdapterKind,
    },

    /// Aggregated health of every available adapter
    Health,

    /// Synchronize a batch of records to one backend
    Sync(SyncArgs),

    /// Fetch one remote item
    Get {
        /// Backend identifier
        #[arg(value_parser = parse_backend)]
        backend: AdapterKind,

        /// Remote item id, key or URI
        id: String,

        /// Remote project (required where ids are project-scoped)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Query remote items
    Query(QueryArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Backend identifier
    #[arg(value_parser = parse_backend)]
    pub backend: AdapterKind,

    /// JSON file with the records to sync
    #[arg(short, long)]
    pub records: PathBuf,

    /// YAML or JSON file with the sync config
    #[arg(short, long)]
    pub sync_config: PathBuf,

    /// Internal project id recorded in logs
    #[arg(long, default_value = "local")]
    pub project_id: String,

    /// Rewrite the records file with the resulting external references
    #[arg(long)]
    pub write_back: bool,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Backend identifier
    #[arg(value_parser = parse_backend)]
    pub backend: AdapterKind,

    /// Remote project
    #[arg(short, long)]
    pub project: String,

    /// Restrict to an item type
    #[arg(short, long)]
    pub item_type: Option<String>,

    /// Restrict to a status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Free-text search on the title
    #[arg(short, long)]
    pub text: Option<String>,

    /// Maximum items to return (capped by the backend limit)
    #[arg(short, long)]
    pub max_results: Option<usize>,
}

/// Parse a backend identifier for clap.
pub fn parse_backend(value: &str) -> Result<AdapterKind, String> {
    AdapterKind::from_str(value).ok_or_else(|| {
        let known: Vec<&str> = AdapterKind::ALL.iter().map(AdapterKind::as_str).collect();
        format!("unknown backend '{value}' (expected one of: {})", known.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::parse_from([
            "almsync", "--json", "query", "ado", "--project", "Med", "--status", "Active",
            "--max-results", "5",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.backend, AdapterKind::AzureDevOps);
                assert_eq!(args.project, "Med");
                assert_eq!(args.status.as_deref(), Some("Active"));
                assert_eq!(args.max_results, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Cli::try_parse_from(["almsync", "test-connection", "rally"]).unwrap_err();
        assert!(err.to_string().contains("unknown backend"), "got: {err}");
    }
}
