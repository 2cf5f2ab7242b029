//! Transaction operations
//!
//! Transactions are append-only: there is no update path, and they disappear
//! only with the upload that owns them.

use rusqlite::{params, OptionalExtension};

use super::{
    format_datetime, parse_column, parse_date_column, parse_datetime_column,
    parse_optional_datetime_column, Database,
};
use crate::error::{constraint_error, Result};
use crate::models::*;

pub(crate) const TRANSACTION_COLUMNS: &str = "t.id, t.source_upload_id, t.txn_date, t.posted_at, \
     t.amount, t.currency, t.description, t.counterparty, t.account_ref, t.reference, t.raw_text, \
     t.normalized_description, t.normalized_counterparty, t.normalized_account, t.normalized_memo, \
     t.created_at";

impl Database {
    /// Record one extracted line item
    pub fn insert_transaction(&self, txn: &NewTransaction) -> Result<i64> {
        txn.validate()?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO transactions (source_upload_id, txn_date, posted_at, amount, currency,
                                      description, counterparty, account_ref, reference, raw_text,
                                      normalized_description, normalized_counterparty,
                                      normalized_account, normalized_memo)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                txn.source_upload_id,
                txn.txn_date.to_string(),
                txn.posted_at.as_ref().map(format_datetime),
                txn.amount.to_string(),
                txn.currency,
                txn.description,
                txn.counterparty,
                txn.account_ref,
                txn.reference,
                txn.raw_text,
                txn.normalized_description,
                txn.normalized_counterparty,
                txn.normalized_account,
                txn.normalized_memo,
            ],
        )
        .map_err(|e| constraint_error(e, "transaction"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let txn = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions t WHERE t.id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(txn)
    }

    /// Transactions extracted from one upload, in statement order
    pub fn list_transactions_for_upload(&self, upload_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.source_upload_id = ? ORDER BY t.txn_date, t.id",
            TRANSACTION_COLUMNS
        ))?;
        let txns = stmt
            .query_map(params![upload_id], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    /// Count transactions, optionally for a single upload
    pub fn count_transactions(&self, upload_id: Option<i64>) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE (?1 IS NULL OR source_upload_id = ?1)",
            params![upload_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        Ok(Transaction {
            id: row.get(0)?,
            source_upload_id: row.get(1)?,
            txn_date: parse_date_column(row, 2)?,
            posted_at: parse_optional_datetime_column(row, 3)?,
            amount: parse_column(row, 4)?,
            currency: row.get(5)?,
            description: row.get(6)?,
            counterparty: row.get(7)?,
            account_ref: row.get(8)?,
            reference: row.get(9)?,
            raw_text: row.get(10)?,
            normalized_description: row.get(11)?,
            normalized_counterparty: row.get(12)?,
            normalized_account: row.get(13)?,
            normalized_memo: row.get(14)?,
            created_at: parse_datetime_column(row, 15)?,
        })
    }
}
