//! Tally Core Library
//!
//! Ledger data model for a small-business bookkeeping tool:
//! - Validated domain types (amounts, confidences, closed enums)
//! - SQLite storage with encryption, pooling and a versioned migration log
//! - Idempotent reference-data seeding (Thai chart of accounts, vendors)
//! - Typed accessors for uploads, transactions, classifications,
//!   reconciliation runs and report snapshots
//! - In-memory category tree

pub mod category_tree;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

/// Test fixtures shared with the CLI's tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use category_tree::{CategoryEntry, CategoryTree};
pub use config::StoreConfig;
pub use db::{ApplyReport, Database, SeedOptions};
pub use error::{Error, Result};
