//! `rotor`: manage a fleet of identity-rotating worker containers.
mod app;
mod cli;
mod menu;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use rotor_observe::{LoggerConfig, logger_init};
use tracing::debug;

use crate::{app::App, cli::Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logger = LoggerConfig::for_cli(cli.global.log_format, cli.global.log_level.clone());
    logger_init(&logger).context("initialising logger")?;

    let cfg = app::load_config(&cli.global, &cli.cmd)?;
    debug!(home = %cfg.home.display(), image = %cfg.image, "configuration loaded");

    let app = App::new(cfg, cli.global.json)?;
    app.dispatch(cli.cmd).await
}
