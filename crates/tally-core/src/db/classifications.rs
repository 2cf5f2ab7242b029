//! Classification operations (one per transaction)

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::transactions::TRANSACTION_COLUMNS;
use super::{parse_column, parse_datetime_column, parse_optional_column, Database};
use crate::error::{constraint_error, Result};
use crate::models::*;

const CLASSIFICATION_COLUMNS: &str = "id, transaction_id, category_id, subcategory_id, vendor_id, \
     tax_tags, confidence, is_override, overridden_by, source, notes, created_at, updated_at";

impl Database {
    /// Classify a transaction. A second classification for the same
    /// transaction is a `UniquenessViolation`; use
    /// [`Database::override_classification`] to correct one.
    pub fn insert_classification(&self, classification: &NewClassification) -> Result<i64> {
        classification.validate()?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO classifications (transaction_id, category_id, subcategory_id, vendor_id,
                                         tax_tags, confidence, is_override, overridden_by,
                                         source, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                classification.transaction_id,
                classification.category_id,
                classification.subcategory_id,
                classification.vendor_id,
                classification.tax_tags.to_json()?,
                classification.confidence.map(|c| c.to_string()),
                classification.is_override,
                classification.overridden_by,
                classification.source.as_str(),
                classification.notes,
            ],
        )
        .map_err(|e| constraint_error(e, "classification"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_classification_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<Classification>> {
        let conn = self.conn()?;
        let classification = conn
            .query_row(
                &format!(
                    "SELECT {} FROM classifications WHERE transaction_id = ?",
                    CLASSIFICATION_COLUMNS
                ),
                params![transaction_id],
                Self::row_to_classification,
            )
            .optional()?;
        Ok(classification)
    }

    /// Manually correct (or set) a transaction's classification
    ///
    /// The row becomes a manual override by `user_id`; any machine
    /// confidence is dropped since it no longer describes the values.
    pub fn override_classification(
        &self,
        transaction_id: i64,
        user_id: i64,
        correction: &ClassificationOverride,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                r#"
                INSERT INTO classifications (transaction_id, category_id, subcategory_id, vendor_id,
                                             tax_tags, confidence, is_override, overridden_by,
                                             source, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1, ?6, 'manual', ?7)
                ON CONFLICT(transaction_id) DO UPDATE SET
                    category_id = excluded.category_id,
                    subcategory_id = excluded.subcategory_id,
                    vendor_id = excluded.vendor_id,
                    tax_tags = excluded.tax_tags,
                    confidence = NULL,
                    is_override = 1,
                    overridden_by = excluded.overridden_by,
                    source = 'manual',
                    notes = excluded.notes,
                    updated_at = CURRENT_TIMESTAMP
                RETURNING id
                "#,
                params![
                    transaction_id,
                    correction.category_id,
                    correction.subcategory_id,
                    correction.vendor_id,
                    correction.tax_tags.to_json()?,
                    user_id,
                    correction.notes,
                ],
                |row| row.get(0),
            )
            .map_err(|e| constraint_error(e, "classification"))?;
        debug!(transaction_id, user_id, "Classification overridden");
        Ok(id)
    }

    /// Transactions with no classification yet, oldest first
    pub fn list_unclassified_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM transactions t
            LEFT JOIN classifications c ON c.transaction_id = t.id
            WHERE c.id IS NULL
            ORDER BY t.txn_date, t.id
            LIMIT ?
            "#,
            TRANSACTION_COLUMNS
        ))?;
        let txns = stmt
            .query_map(params![limit as i64], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    fn row_to_classification(row: &rusqlite::Row) -> rusqlite::Result<Classification> {
        let tax_tags: String = row.get(5)?;
        Ok(Classification {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            category_id: row.get(2)?,
            subcategory_id: row.get(3)?,
            vendor_id: row.get(4)?,
            tax_tags: TaxTags::from_json(&tax_tags).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
            confidence: parse_optional_column(row, 6)?,
            is_override: row.get(7)?,
            overridden_by: row.get(8)?,
            source: parse_column(row, 9)?,
            notes: row.get(10)?,
            created_at: parse_datetime_column(row, 11)?,
            updated_at: parse_datetime_column(row, 12)?,
        })
    }
}
