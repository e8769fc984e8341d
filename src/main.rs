//! almsync CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use almsync::cli::{commands, handle_error, load_config, Cli};
use almsync::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return handle_error(&err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => return handle_error(&err, cli.json),
    };

    match commands::dispatch(cli.command, &config, cli.json).await {
        Ok(code) => code,
        Err(err) => handle_error(&err, cli.json),
    }
}
