//! Versioned migration log
//!
//! Each migration is an ordered list of individually idempotent statements.
//! The applier executes them one at a time and records the migration in
//! `schema_migrations` only after every statement succeeded. A failure stops
//! the run with the failing statement attached; statements that already ran
//! stay in effect, and because each one is idempotent the next run simply
//! re-executes the migration from the top.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{parse_datetime_column, seed::SeedSetReport};
use crate::error::{Error, Result};

/// One schema revision
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

impl Migration {
    /// SHA256 over the statement texts, recorded when the migration is applied
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for statement in self.statements {
            hasher.update(statement.trim().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// A row of `schema_migrations`
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
    pub checksum: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

/// What one apply run changed
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    /// Versions applied by this run, ascending
    pub migrations_applied: Vec<u32>,
    /// Schema statements executed by this run
    pub statements_executed: usize,
    /// Per reference table seed results
    pub seed_sets: Vec<SeedSetReport>,
}

impl ApplyReport {
    /// Seed rows inserted or updated by this run
    pub fn seed_rows_changed(&self) -> usize {
        self.seed_sets.iter().map(|s| s.changed).sum()
    }

    /// True when the run found nothing to do
    pub fn is_noop(&self) -> bool {
        self.migrations_applied.is_empty() && self.seed_rows_changed() == 0
    }
}

const MIGRATION_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Schema history, oldest first. Never edit an applied entry; add a new one.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "reference_data",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user'
                    CHECK (role IN ('admin', 'accountant', 'user')),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS thai_accounting_categories (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                name_th TEXT NOT NULL,
                name_en TEXT,
                category_type TEXT NOT NULL
                    CHECK (category_type IN ('income', 'expense', 'cogs', 'asset', 'liability', 'equity', 'tax')),
                parent_id INTEGER REFERENCES thai_accounting_categories(id) ON DELETE SET NULL,
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                CHECK (parent_id IS NULL OR parent_id != id)
            )
            "#,
            // NULL parents never collide here; root names are checked by the accessors
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_parent_name ON thai_accounting_categories(parent_id, name_th)",
            "CREATE INDEX IF NOT EXISTS idx_categories_parent ON thai_accounting_categories(parent_id)",
            r#"
            CREATE TABLE IF NOT EXISTS vendors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                default_category_id INTEGER REFERENCES thai_accounting_categories(id) ON DELETE SET NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_vendors_category ON vendors(default_category_id)",
        ],
    },
    Migration {
        version: 2,
        name: "ingestion",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                id INTEGER PRIMARY KEY,
                upload_type TEXT NOT NULL
                    CHECK (upload_type IN ('bank_statement', 'receipt', 'other')),
                original_filename TEXT NOT NULL,
                stored_filename TEXT,
                mime_type TEXT,
                size_bytes INTEGER CHECK (size_bytes IS NULL OR size_bytes >= 0),
                content_hash TEXT,
                uploaded_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                statement_period_start DATE,
                statement_period_end DATE,
                status TEXT NOT NULL DEFAULT 'uploaded'
                    CHECK (status IN ('uploaded', 'processing', 'processed', 'failed')),
                error_message TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                CHECK (statement_period_start IS NULL OR statement_period_end IS NULL
                       OR statement_period_start <= statement_period_end)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status)",
            "CREATE INDEX IF NOT EXISTS idx_uploads_hash ON uploads(content_hash)",
            "CREATE INDEX IF NOT EXISTS idx_uploads_uploaded_by ON uploads(uploaded_by)",
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                source_upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
                txn_date DATE NOT NULL,
                posted_at DATETIME,
                amount TEXT NOT NULL CHECK (amount GLOB '*[0-9].[0-9][0-9]'),
                currency TEXT NOT NULL DEFAULT 'THB' CHECK (length(currency) = 3),
                description TEXT NOT NULL,
                counterparty TEXT,
                account_ref TEXT,
                reference TEXT,
                raw_text TEXT,
                normalized_description TEXT,
                normalized_counterparty TEXT,
                normalized_account TEXT,
                normalized_memo TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transactions_upload ON transactions(source_upload_id)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(txn_date)",
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_transactions_upload_immutable
            BEFORE UPDATE OF source_upload_id ON transactions
            WHEN NEW.source_upload_id IS NOT OLD.source_upload_id
            BEGIN
                SELECT RAISE(ABORT, 'transactions.source_upload_id is immutable');
            END
            "#,
        ],
    },
    Migration {
        version: 3,
        name: "classifications",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS classifications (
                id INTEGER PRIMARY KEY,
                transaction_id INTEGER NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
                category_id INTEGER REFERENCES thai_accounting_categories(id) ON DELETE SET NULL,
                subcategory_id INTEGER REFERENCES thai_accounting_categories(id) ON DELETE SET NULL,
                vendor_id INTEGER REFERENCES vendors(id) ON DELETE SET NULL,
                tax_tags TEXT NOT NULL DEFAULT '[]' CHECK (json_valid(tax_tags)),
                confidence TEXT CHECK (confidence IS NULL
                    OR (CAST(confidence AS REAL) >= 0 AND CAST(confidence AS REAL) <= 1)),
                is_override BOOLEAN NOT NULL DEFAULT 0,
                overridden_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                source TEXT NOT NULL CHECK (source IN ('manual', 'ai', 'rule')),
                notes TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_classifications_category ON classifications(category_id)",
            "CREATE INDEX IF NOT EXISTS idx_classifications_vendor ON classifications(vendor_id)",
        ],
    },
    Migration {
        version: 4,
        name: "reconciliation",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS reconciliation_runs (
                id INTEGER PRIMARY KEY,
                started_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                finished_at DATETIME,
                strategy TEXT NOT NULL
                    CHECK (strategy IN ('exact_amount_date', 'fuzzy', 'manual', 'hybrid')),
                parameters TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(parameters)),
                status TEXT NOT NULL DEFAULT 'running'
                    CHECK (status IN ('running', 'completed', 'failed')),
                created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                notes TEXT,
                CHECK ((status = 'running') = (finished_at IS NULL))
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_reconciliation_runs_status ON reconciliation_runs(status)",
            // created_by is left out so a user's SET NULL still reaches finished runs
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_reconciliation_runs_final
            BEFORE UPDATE OF started_at, finished_at, strategy, parameters, status, notes
            ON reconciliation_runs
            WHEN OLD.status != 'running'
            BEGIN
                SELECT RAISE(ABORT, 'reconciliation run is finished and immutable');
            END
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS reconciliation_results (
                id INTEGER PRIMARY KEY,
                run_id INTEGER NOT NULL REFERENCES reconciliation_runs(id) ON DELETE CASCADE,
                transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                matched_upload_id INTEGER REFERENCES uploads(id) ON DELETE SET NULL,
                match_status TEXT NOT NULL
                    CHECK (match_status IN ('matched', 'unmatched', 'ambiguous', 'ignored')),
                match_score TEXT CHECK (match_score IS NULL
                    OR (CAST(match_score AS REAL) >= 0 AND CAST(match_score AS REAL) <= 1)),
                notes TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (run_id, transaction_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_reconciliation_results_transaction ON reconciliation_results(transaction_id)",
            "CREATE INDEX IF NOT EXISTS idx_reconciliation_results_upload ON reconciliation_results(matched_upload_id)",
        ],
    },
    Migration {
        version: 5,
        name: "reports",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY,
                report_type TEXT NOT NULL CHECK (report_type IN ('summary', 'pnl')),
                period_start DATE NOT NULL,
                period_end DATE NOT NULL,
                reconciliation_run_id INTEGER REFERENCES reconciliation_runs(id) ON DELETE SET NULL,
                parameters TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(parameters)),
                payload TEXT NOT NULL CHECK (json_valid(payload)),
                generated_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                generated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (report_type, period_start, period_end),
                CHECK (period_start <= period_end)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_reports_generated_at ON reports(generated_at)",
            // Reference columns stay writable so SET NULL can reach snapshots
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_reports_append_only
            BEFORE UPDATE OF report_type, period_start, period_end, parameters, payload, generated_at
            ON reports
            BEGIN
                SELECT RAISE(ABORT, 'report snapshots are append-only');
            END
            "#,
        ],
    },
];

/// Highest version compiled into this binary
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub(crate) fn ensure_log(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_LOG)?;
    Ok(())
}

fn log_exists(conn: &Connection) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Recorded migrations; a store that never ran the applier has none
///
/// Read-only: the log table is only created by [`run_pending`].
pub(crate) fn applied(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    if !log_exists(conn)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT version, name, checksum, applied_at FROM schema_migrations ORDER BY version",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                name: row.get(1)?,
                checksum: row.get(2)?,
                applied_at: parse_datetime_column(row, 3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn current_version(conn: &Connection) -> Result<u32> {
    Ok(applied(conn)?.last().map(|m| m.version).unwrap_or(0))
}

pub(crate) fn pending(conn: &Connection) -> Result<Vec<&'static Migration>> {
    let done: Vec<u32> = applied(conn)?.into_iter().map(|m| m.version).collect();
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !done.contains(&m.version))
        .collect())
}

/// Fail if an applied migration's statements changed since it was recorded
pub(crate) fn verify_checksums(conn: &Connection) -> Result<()> {
    let known: HashMap<u32, &Migration> = MIGRATIONS.iter().map(|m| (m.version, m)).collect();
    for row in applied(conn)? {
        match known.get(&row.version) {
            Some(migration) if migration.checksum() != row.checksum => {
                warn!(version = row.version, name = %row.name, "Migration checksum mismatch");
                return Err(Error::MigrationDrift {
                    version: row.version,
                    name: row.name,
                });
            }
            Some(_) => {}
            // Applied by a newer binary; nothing to compare against
            None => debug!(version = row.version, "Unknown applied migration"),
        }
    }
    Ok(())
}

/// Apply every pending migration in order
pub(crate) fn run_pending(conn: &Connection, report: &mut ApplyReport) -> Result<()> {
    ensure_log(conn)?;
    verify_checksums(conn)?;

    for migration in pending(conn)? {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        let step = format!("migration {} ({})", migration.version, migration.name);

        for (i, statement) in migration.statements.iter().enumerate() {
            let index = i + 1;
            debug!(version = migration.version, index, "Executing statement");
            conn.execute_batch(statement).map_err(|source| Error::Apply {
                step: step.clone(),
                index,
                statement: statement.trim().to_string(),
                source,
            })?;
            report.statements_executed += 1;
        }

        conn.execute(
            "INSERT INTO schema_migrations (version, name, checksum) VALUES (?, ?, ?)",
            params![migration.version, migration.name, migration.checksum()],
        )?;
        report.migrations_applied.push(migration.version);
    }

    Ok(())
}
