mod backend_api;
mod cli;
mod commands;
mod config;
mod db;
mod decoder;
mod error;
mod generation;
mod models;
mod session;
mod state;
mod status;
mod stream;
mod view;

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::commands::AppContext;
use crate::config::Config;

// Logs go to stderr so stdout carries only documentation
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docgen={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_args(&cli.global)?;
    let mut ctx = AppContext::open(config).await?;
    debug!(view = ?ctx.app_state.view(), db = %ctx.config.db_path.display(), "client state loaded");

    match cli.command {
        Command::Generate(args) => commands::generate(&mut ctx, args).await,
        Command::Status { watch } => commands::status(&mut ctx, watch).await,
        Command::Register(args) => commands::register(&mut ctx, args).await,
        Command::Login(args) => commands::login(&mut ctx, args).await,
        Command::Logout => commands::logout(&mut ctx).await,
        Command::History(command) => commands::history(&mut ctx, command).await,
        Command::Export(args) => commands::export(&mut ctx, args).await,
        Command::Copy { id } => commands::copy(&mut ctx, id).await,
        Command::Documents => commands::documents(&mut ctx).await,
        Command::Model { model } => commands::model(&mut ctx, model).await,
        Command::Theme { action } => commands::theme(&mut ctx, action).await,
    }
}

// application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
