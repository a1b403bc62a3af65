mod analysis;
mod changes;
mod cli;
mod commands;
mod config;
mod error;
mod layout;
mod manifest;
mod model;
mod publish;
mod qa;
mod run_dir;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Allocate(args) => commands::allocate::run(args),
        Commands::Seal(args) => commands::seal::run(args),
        Commands::Qa(args) => commands::qa::run(args),
        Commands::Publish(args) => commands::publish::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::AnalyzeToday(args) => commands::analyze::run_today(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
