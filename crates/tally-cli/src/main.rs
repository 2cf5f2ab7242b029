//! Tally CLI - ledger schema applier
//!
//! Usage:
//!   tally apply               Create/upgrade schema and seed reference data
//!   tally status              Show store status and row counts
//!   tally migrations          List applied and pending migrations
//!   tally categories          Show the chart of accounts
//!   tally vendors             List vendors

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config =
        commands::resolve_config(cli.config.as_deref(), cli.db.as_deref(), cli.no_encrypt)?;

    match cli.command {
        Commands::Apply {
            no_demo_users,
            json,
        } => {
            let db = commands::connect(&config)?;
            commands::cmd_apply(&db, &config, no_demo_users, json)
        }
        Commands::Status => commands::cmd_status(&config),
        Commands::Migrations => commands::cmd_migrations(&config),
        Commands::Categories { json } => {
            let db = commands::open_db(&config)?;
            commands::cmd_categories(&db, json)
        }
        Commands::Vendors { json } => {
            let db = commands::open_db(&config)?;
            commands::cmd_vendors(&db, json)
        }
    }
}
