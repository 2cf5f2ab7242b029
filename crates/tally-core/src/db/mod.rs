//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `migrations` - Versioned migration log and the statement-by-statement applier
//! - `seed` - Reference data (chart of accounts, vendors, demo users)
//! - `users` - Application users
//! - `uploads` - Ingested files and their processing status
//! - `categories` - Chart of accounts (tree) operations
//! - `vendors` - Counterparties with default categories
//! - `transactions` - Extracted line items (append-only)
//! - `classifications` - One categorization per transaction
//! - `reconciliation` - Reconciliation runs and per-transaction results
//! - `reports` - Append-only report snapshots

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::models::TableCount;

mod categories;
mod classifications;
pub mod migrations;
mod reconciliation;
mod reports;
pub mod seed;
mod transactions;
mod uploads;
mod users;
mod vendors;

pub use migrations::{AppliedMigration, ApplyReport, Migration, MIGRATIONS};
pub use seed::{SeedOptions, SeedSetReport};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Ledger tables in dependency order (leaves first)
pub const LEDGER_TABLES: &[&str] = &[
    "users",
    "thai_accounting_categories",
    "vendors",
    "uploads",
    "transactions",
    "classifications",
    "reconciliation_runs",
    "reconciliation_results",
    "reports",
];

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted store
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-ok";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Timestamp layout shared with SQLite's `CURRENT_TIMESTAMP`
///
/// `%.f` writes fractional seconds only when there are any and accepts
/// their absence on read, so both column defaults and precise
/// `posted_at` values round-trip.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map(|dt| dt.and_utc())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does, keeping sub-second digits
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Read a timestamp column; unparsable text is a conversion error, not "now"
pub(crate) fn parse_datetime_column(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_optional_datetime_column(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_datetime(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a text column and parse it, surfacing bad values as conversion errors
pub(crate) fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Nullable variant of [`parse_column`]
pub(crate) fn parse_optional_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn parse_date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    parse_column(row, idx)
}

pub(crate) fn parse_json_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<serde_json::Value> {
    parse_column(row, idx)
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    encrypted: bool,
}

impl Database {
    /// Open an encrypted store and bring its schema up to date
    ///
    /// Requires `TALLY_DB_KEY` to be set. Use `new_unencrypted()` for
    /// development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let key = std::env::var(DB_KEY_ENV).map_err(|_| {
            Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))
        })?;
        Self::new_with_key(path, Some(&key))
    }

    /// Open an unencrypted store and bring its schema up to date
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Open a store with an explicit passphrase and run pending migrations
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let db = Self::connect(path, passphrase)?;
        db.run_migrations()?;
        Ok(db)
    }

    /// Open the pool without touching the schema
    ///
    /// Used by the applier, which reports migration progress itself.
    pub fn connect(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Every pooled connection needs the key and FK enforcement; SQLite
        // scopes both to the connection, not the file.
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(ref pragma) = key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.execute_batch(
                r#"
                PRAGMA foreign_keys = ON;
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                "#,
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;
        debug!(path, encrypted = passphrase.is_some(), "Opened connection pool");

        Ok(Self {
            pool,
            db_path: path.to_string(),
            encrypted: passphrase.is_some(),
        })
    }

    /// Open the store described by a config without running migrations
    pub fn connect_with_config(config: &StoreConfig) -> Result<Self> {
        let passphrase = config.passphrase()?;
        Self::connect(&config.database_path()?, passphrase.as_deref())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Whether the pool was opened with a SQLCipher key
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run pending schema migrations (no seeding)
    pub fn run_migrations(&self) -> Result<ApplyReport> {
        let conn = self.conn()?;
        let mut report = ApplyReport::default();
        migrations::run_pending(&conn, &mut report)?;
        if !report.migrations_applied.is_empty() {
            info!(
                version = migrations::latest_version(),
                "Database schema initialized"
            );
        }
        Ok(report)
    }

    /// Apply schema and reference data with default seed options
    pub fn apply(&self) -> Result<ApplyReport> {
        self.apply_with(&SeedOptions::default())
    }

    /// Apply pending migrations, then upsert reference rows
    ///
    /// Safe to run any number of times. One connection is held for the whole
    /// run and statements execute one at a time; the first failure stops the
    /// run and earlier statements stay applied.
    pub fn apply_with(&self, options: &SeedOptions) -> Result<ApplyReport> {
        let conn = self.conn()?;
        let mut report = ApplyReport::default();
        migrations::run_pending(&conn, &mut report)?;
        seed::seed_reference_data(&conn, options, &mut report)?;
        info!(
            migrations = report.migrations_applied.len(),
            statements = report.statements_executed,
            seed_rows_changed = report.seed_rows_changed(),
            "Apply complete"
        );
        Ok(report)
    }

    /// Current schema version (0 for a fresh store)
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        migrations::current_version(&conn)
    }

    /// Migrations recorded in the log
    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let conn = self.conn()?;
        migrations::applied(&conn)
    }

    /// Compiled-in migrations not yet recorded in the log
    pub fn pending_migrations(&self) -> Result<Vec<&'static Migration>> {
        let conn = self.conn()?;
        migrations::pending(&conn)
    }

    /// Row counts for every ledger table that exists
    pub fn table_counts(&self) -> Result<Vec<TableCount>> {
        let conn = self.conn()?;
        let mut counts = Vec::with_capacity(LEDGER_TABLES.len());
        for table in LEDGER_TABLES {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                [table],
                |row| row.get(0),
            )?;
            if !exists {
                continue;
            }
            let rows: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            counts.push(TableCount { table, rows });
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests;
