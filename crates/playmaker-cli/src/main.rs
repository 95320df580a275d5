//! Playmaker CLI - live match scores, attendance and workloads in the terminal
//!
//! A terminal consumer of `playmaker-core`: shows projections, follows a
//! resource over the push connection, and applies optimistic updates.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::attend::run_attend;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::score::run_score;
use crate::commands::show::run_show;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("playmaker=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Show { handle, json } => run_show(&handle, json, profile).await?,
        Commands::Watch { handle, scope } => run_watch(&handle, &scope, profile).await?,
        Commands::Score {
            match_id,
            side,
            points,
        } => run_score(&match_id, side.into(), points, profile).await?,
        Commands::Attend {
            session_id,
            player_id,
            mark,
        } => run_attend(&session_id, &player_id, mark.into(), profile).await?,
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
