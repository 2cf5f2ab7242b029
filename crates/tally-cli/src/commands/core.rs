//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `resolve_config` - Config file plus command-line overrides
//! - `connect` / `open_db` - Shared utilities to open the store
//! - `cmd_apply` - Apply migrations and reference data

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::db::{Database, MIGRATIONS};
use tally_core::StoreConfig;

/// Load the config file and apply `--db` / `--no-encrypt` on top
pub fn resolve_config(
    config_path: Option<&Path>,
    db_path: Option<&Path>,
    no_encrypt: bool,
) -> Result<StoreConfig> {
    let mut config = StoreConfig::load(config_path).context("Failed to load config")?;
    if let Some(path) = db_path {
        config.database.path = path.to_path_buf();
    }
    if no_encrypt {
        config.database.encrypt = false;
    }
    Ok(config)
}

/// Open the store without touching its schema
pub fn connect(config: &StoreConfig) -> Result<Database> {
    Database::connect_with_config(config).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.path.display()
        )
    })
}

/// Open the store and bring its schema up to date
pub fn open_db(config: &StoreConfig) -> Result<Database> {
    let db = connect(config)?;
    db.run_migrations().context("Failed to migrate database")?;
    Ok(db)
}

pub fn cmd_apply(
    db: &Database,
    config: &StoreConfig,
    no_demo_users: bool,
    json: bool,
) -> Result<()> {
    let mut options = config.seed.clone();
    if no_demo_users {
        options.demo_users = false;
    }

    if !json {
        println!("🔧 Applying schema to {}...", db.path());
    }

    let report = db.apply_with(&options).context("Apply failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for version in &report.migrations_applied {
        let name = MIGRATIONS
            .iter()
            .find(|m| m.version == *version)
            .map(|m| m.name)
            .unwrap_or("unknown");
        println!("   ✓ migration {} ({})", version, name);
    }
    if report.migrations_applied.is_empty() {
        println!("   Schema already up to date");
    }
    for set in &report.seed_sets {
        println!(
            "   ✓ seed {}: {}/{} rows changed",
            set.set, set.changed, set.total
        );
    }

    if db.is_encrypted() {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }

    println!(
        "✅ Schema at version {} ({} migrations, {} statements, {} seed rows changed)",
        db.schema_version()?,
        report.migrations_applied.len(),
        report.statements_executed,
        report.seed_rows_changed()
    );
    Ok(())
}
