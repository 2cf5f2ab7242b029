//! CLI argument definitions using clap
//!
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - bookkeeping ledger schema tool
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Apply and inspect the Tally ledger schema", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to $TALLY_CONFIG, then ~/.config/tally/tally.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the schema and refresh reference data
    Apply {
        /// Skip the demo user accounts
        #[arg(long)]
        no_demo_users: bool,

        /// Print the apply report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show store location, encryption and row counts
    Status,

    /// List applied and pending migrations
    Migrations,

    /// Show the chart of accounts as a tree
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List vendors with their default category
    Vendors {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
