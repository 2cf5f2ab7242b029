//! Vendor operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime_column, Database};
use crate::error::{constraint_error, Error, Result};
use crate::models::*;

const VENDOR_COLUMNS: &str = "id, name, default_category_id, created_at, updated_at";

impl Database {
    pub fn create_vendor(&self, vendor: &NewVendor) -> Result<i64> {
        vendor.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO vendors (name, default_category_id) VALUES (?, ?)",
            params![vendor.name, vendor.default_category_id],
        )
        .map_err(|e| constraint_error(e, "vendor"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert or refresh a vendor keyed on name (only the default category changes)
    pub fn upsert_vendor(&self, vendor: &NewVendor) -> Result<i64> {
        vendor.validate()?;
        let conn = self.conn()?;
        let id = conn
            .query_row(
                r#"
                INSERT INTO vendors (name, default_category_id) VALUES (?1, ?2)
                ON CONFLICT(name) DO UPDATE SET
                    default_category_id = excluded.default_category_id,
                    updated_at = CURRENT_TIMESTAMP
                RETURNING id
                "#,
                params![vendor.name, vendor.default_category_id],
                |row| row.get(0),
            )
            .map_err(|e| constraint_error(e, "vendor"))?;
        Ok(id)
    }

    pub fn get_vendor(&self, id: i64) -> Result<Option<Vendor>> {
        let conn = self.conn()?;
        let vendor = conn
            .query_row(
                &format!("SELECT {} FROM vendors WHERE id = ?", VENDOR_COLUMNS),
                params![id],
                Self::row_to_vendor,
            )
            .optional()?;
        Ok(vendor)
    }

    pub fn get_vendor_by_name(&self, name: &str) -> Result<Option<Vendor>> {
        let conn = self.conn()?;
        let vendor = conn
            .query_row(
                &format!("SELECT {} FROM vendors WHERE name = ?", VENDOR_COLUMNS),
                params![name.trim()],
                Self::row_to_vendor,
            )
            .optional()?;
        Ok(vendor)
    }

    pub fn list_vendors(&self) -> Result<Vec<Vendor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM vendors ORDER BY name COLLATE NOCASE",
            VENDOR_COLUMNS
        ))?;
        let vendors = stmt
            .query_map([], Self::row_to_vendor)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(vendors)
    }

    /// Delete a vendor; classifications that used it keep their rows with
    /// `vendor_id` cleared
    pub fn delete_vendor(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM vendors WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("vendor {}", id)));
        }
        Ok(())
    }

    fn row_to_vendor(row: &rusqlite::Row) -> rusqlite::Result<Vendor> {
        Ok(Vendor {
            id: row.get(0)?,
            name: row.get(1)?,
            default_category_id: row.get(2)?,
            created_at: parse_datetime_column(row, 3)?,
            updated_at: parse_datetime_column(row, 4)?,
        })
    }
}
