//! Test utilities for tally-core
//!
//! Fixtures for building small, fully-linked ledgers in tests. Everything here
//! panics on failure since it only ever runs under test.

use chrono::NaiveDate;

use crate::db::Database;
use crate::models::*;

/// Fresh store with schema and reference data applied
pub fn seeded_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.apply().unwrap();
    db
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bank statement with three transactions and one receipt
pub struct LedgerFixture {
    pub db: Database,
    pub statement_id: i64,
    pub receipt_id: i64,
    pub transaction_ids: Vec<i64>,
}

impl LedgerFixture {
    pub fn new() -> Self {
        let db = seeded_db();

        let statement = NewUpload::new(UploadType::BankStatement, "kbank-2024-03.pdf")
            .with_content(b"statement bytes")
            .with_period(date(2024, 3, 1), date(2024, 3, 31));
        let statement_id = db.create_upload(&statement).unwrap();

        let receipt =
            NewUpload::new(UploadType::Receipt, "7-eleven-0312.jpg").with_content(b"receipt bytes");
        let receipt_id = db.create_upload(&receipt).unwrap();

        let lines = [
            (date(2024, 3, 5), -45_000, "ค่าเช่าสำนักงาน"),
            (date(2024, 3, 12), -12_550, "7-ELEVEN SUKHUMVIT"),
            (date(2024, 3, 20), 150_000, "Transfer from client"),
        ];
        let transaction_ids = lines
            .iter()
            .map(|(day, minor, desc)| {
                let txn = NewTransaction::new(statement_id, *day, Amount::from_minor_units(*minor), desc);
                db.insert_transaction(&txn).unwrap()
            })
            .collect();

        Self {
            db,
            statement_id,
            receipt_id,
            transaction_ids,
        }
    }

    /// Id of a seeded category by code
    pub fn category(&self, code: &str) -> i64 {
        self.db.get_category_by_code(code).unwrap().unwrap().id
    }

    /// Id of a seeded vendor by name
    pub fn vendor(&self, name: &str) -> i64 {
        self.db.get_vendor_by_name(name).unwrap().unwrap().id
    }

    /// Id of a seeded demo user by email
    pub fn user(&self, email: &str) -> i64 {
        self.db.get_user_by_email(email).unwrap().unwrap().id
    }

    /// Count rows in a table with a raw query
    pub fn count(&self, table: &str) -> i64 {
        let conn = self.db.conn().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }
}

impl Default for LedgerFixture {
    fn default() -> Self {
        Self::new()
    }
}
