//! Error types for Tally

use rusqlite::ffi;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value outside an enum's closed set, or a precision/range violation
    #[error("Invalid value: {0}")]
    Domain(String),

    /// Natural-key collision outside the upsert path
    #[error("Duplicate {entity}: {detail}")]
    UniquenessViolation { entity: &'static str, detail: String },

    /// Foreign key points at a row that does not exist
    #[error("Referential integrity: {0}")]
    ReferentialIntegrity(String),

    /// Operation not allowed in the row's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A schema or seed statement failed while applying
    #[error("{step}: statement #{index} failed: {source}\n{statement}")]
    Apply {
        step: String,
        index: usize,
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A recorded migration no longer matches the compiled-in statements
    #[error("Migration {version} ({name}) was modified after it was applied")]
    MigrationDrift { version: u32, name: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }
}

/// Translate SQLite constraint failures into typed errors.
///
/// `entity` names the table being written so duplicate-key errors read well.
/// Non-constraint errors pass through as `Error::Database`.
pub(crate) fn constraint_error(err: rusqlite::Error, entity: &'static str) -> Error {
    let (code, message) = match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            (e.extended_code, msg.clone().unwrap_or_default())
        }
        _ => return Error::Database(err),
    };

    match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            Error::UniquenessViolation {
                entity,
                detail: message,
            }
        }
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::ReferentialIntegrity(format!(
            "{} references a row that does not exist",
            entity
        )),
        ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
            Error::Domain(format!("{}: {}", entity, message))
        }
        ffi::SQLITE_CONSTRAINT_TRIGGER => Error::InvalidState(message),
        _ => Error::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT UNIQUE);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER NOT NULL REFERENCES parent(id),
                 score REAL CHECK (score BETWEEN 0 AND 1)
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_unique_maps_to_uniqueness_violation() {
        let conn = conn();
        conn.execute("INSERT INTO parent (name) VALUES ('a')", [])
            .unwrap();
        let err = conn
            .execute("INSERT INTO parent (name) VALUES ('a')", [])
            .unwrap_err();
        match constraint_error(err, "parent") {
            Error::UniquenessViolation { entity, .. } => assert_eq!(entity, "parent"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_foreign_key_maps_to_referential_integrity() {
        let conn = conn();
        let err = conn
            .execute("INSERT INTO child (parent_id) VALUES (99)", [])
            .unwrap_err();
        assert!(matches!(
            constraint_error(err, "child"),
            Error::ReferentialIntegrity(_)
        ));
    }

    #[test]
    fn test_check_maps_to_domain() {
        let conn = conn();
        conn.execute("INSERT INTO parent (name) VALUES ('a')", [])
            .unwrap();
        let err = conn
            .execute("INSERT INTO child (parent_id, score) VALUES (1, 1.5)", [])
            .unwrap_err();
        assert!(matches!(constraint_error(err, "child"), Error::Domain(_)));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let conn = conn();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        assert!(matches!(
            constraint_error(err, "missing"),
            Error::Database(_)
        ));
    }
}
