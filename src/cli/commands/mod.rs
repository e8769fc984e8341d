//! CLI command implementations.

pub mod adapters;
pub mod health;
pub mod item;
pub mod sync;

use std::process::ExitCode;

use anyhow::{Context, Result};

use crate::adapters::plugins::transport::ClientSettings;
use crate::cli::types::Commands;
use crate::domain::models::Config;
use crate::domain::ports::SecretSource;
use crate::infrastructure::secrets::{EnvSecretSource, FileSecretSource};
use crate::services::AdapterRegistry;

/// Secret source selected by `secrets.dir`.
pub fn secret_source(config: &Config) -> Box<dyn SecretSource> {
    match &config.secrets.dir {
        Some(dir) => Box::new(FileSecretSource::new(dir)),
        None => Box::new(EnvSecretSource::new()),
    }
}

/// Registry with every configured backend brought up.
pub async fn connect(config: &Config) -> Result<AdapterRegistry> {
    let source = secret_source(config);
    let mut registry = AdapterRegistry::new(ClientSettings::from_config(config));
    registry
        .initialize(source.as_ref(), &config.backends)
        .await
        .context("Failed to initialize adapters")?;
    Ok(registry)
}

/// Run one command against a freshly initialized registry.
pub async fn dispatch(command: Commands, config: &Config, json: bool) -> Result<ExitCode> {
    let mut registry = connect(config).await?;
    let result = match command {
        Commands::Adapters => adapters::execute(&registry, json),
        Commands::TestConnection { backend } => {
            item::test_connection(&registry, backend, json).await
        }
        Commands::Health => health::execute(&registry, json).await,
        Commands::Sync(args) => sync::execute(&registry, args, json).await,
        Commands::Get {
            backend,
            id,
            project,
        } => item::get(&registry, backend, &id, project, json).await,
        Commands::Query(args) => item::query(&registry, args, json).await,
    };
    registry.cleanup().await;
    result
}
