//! Status-related command implementations (status, migrations)

use std::fs;

use anyhow::Result;
use tally_core::db::migrations::latest_version;
use tally_core::db::MIGRATIONS;
use tally_core::StoreConfig;

use super::connect;

pub fn cmd_status(config: &StoreConfig) -> Result<()> {
    let db_path = &config.database.path;
    let key_env = &config.database.key_env;

    println!();
    println!("📊 Tally Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());
    if let Some(source) = &config.source {
        println!("   Config: {}", source.display());
    }

    // Check if database file exists and get size
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized, run `tally apply`)");
    }

    let has_key = std::env::var(key_env).is_ok();
    if !config.database.encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", key_env);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", key_env);
    }

    if db_path.exists() {
        match connect(config) {
            Ok(db) => {
                let version = db.schema_version()?;
                println!(
                    "   Schema: version {} of {}",
                    version,
                    latest_version()
                );
                println!();
                for count in db.table_counts()? {
                    println!("   {:<28} {:>8}", count.table, count.rows);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {:#}", e);
                if config.database.encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", key_env);
                } else if has_key {
                    println!("      (Check if {} is correct)", key_env);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_migrations(config: &StoreConfig) -> Result<()> {
    let db_path = &config.database.path;

    // Opening would create the file, so a missing store is listed without it
    let (applied, pending) = if db_path.exists() {
        let db = connect(config)?;
        (db.applied_migrations()?, db.pending_migrations()?)
    } else {
        (Vec::new(), MIGRATIONS.iter().collect())
    };

    println!();
    println!("🗂️  Migrations ({})", db_path.display());
    println!("   ─────────────────────────────────────────────────────────────");

    for m in &applied {
        println!(
            "   ✓ {:>3}  {:<20} {}  {}",
            m.version,
            m.name,
            m.checksum.get(..12).unwrap_or(&m.checksum),
            m.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    for m in &pending {
        println!("   · {:>3}  {:<20} pending", m.version, m.name);
    }

    println!();
    if pending.is_empty() {
        println!("   Up to date at version {}", latest_version());
    } else {
        println!(
            "   {} pending migration(s); run `tally apply`",
            pending.len()
        );
    }
    Ok(())
}
