//! Upload operations

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{parse_column, parse_datetime_column, parse_optional_column, Database};
use crate::error::{constraint_error, Error, Result};
use crate::models::*;

const UPLOAD_COLUMNS: &str = "id, upload_type, original_filename, stored_filename, mime_type, \
     size_bytes, content_hash, uploaded_by, statement_period_start, statement_period_end, \
     status, error_message, created_at, updated_at";

impl Database {
    /// Register an ingested file. New uploads start in `uploaded`.
    pub fn create_upload(&self, upload: &NewUpload) -> Result<i64> {
        upload.validate()?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO uploads (upload_type, original_filename, stored_filename, mime_type,
                                 size_bytes, content_hash, uploaded_by,
                                 statement_period_start, statement_period_end)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                upload.upload_type.as_str(),
                upload.original_filename,
                upload.stored_filename,
                upload.mime_type,
                upload.size_bytes,
                upload.content_hash,
                upload.uploaded_by,
                upload.statement_period_start.map(|d| d.to_string()),
                upload.statement_period_end.map(|d| d.to_string()),
            ],
        )
        .map_err(|e| constraint_error(e, "upload"))?;
        let id = conn.last_insert_rowid();
        debug!(id, file = %upload.original_filename, "Created upload");
        Ok(id)
    }

    pub fn get_upload(&self, id: i64) -> Result<Option<Upload>> {
        let conn = self.conn()?;
        let upload = conn
            .query_row(
                &format!("SELECT {} FROM uploads WHERE id = ?", UPLOAD_COLUMNS),
                params![id],
                Self::row_to_upload,
            )
            .optional()?;
        Ok(upload)
    }

    /// Find an earlier upload of the same file (oldest first wins)
    pub fn find_upload_by_hash(&self, content_hash: &str) -> Result<Option<Upload>> {
        let conn = self.conn()?;
        let upload = conn
            .query_row(
                &format!(
                    "SELECT {} FROM uploads WHERE content_hash = ? ORDER BY id LIMIT 1",
                    UPLOAD_COLUMNS
                ),
                params![content_hash],
                Self::row_to_upload,
            )
            .optional()?;
        Ok(upload)
    }

    /// List uploads, newest first, optionally filtered by status
    pub fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<Upload>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM uploads WHERE (?1 IS NULL OR status = ?1) ORDER BY id DESC",
            UPLOAD_COLUMNS
        ))?;
        let uploads = stmt
            .query_map(params![status.map(|s| s.as_str())], Self::row_to_upload)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(uploads)
    }

    /// Move an upload through its processing lifecycle
    ///
    /// `error_message` is stored when moving to `failed` and cleared otherwise.
    pub fn update_upload_status(
        &self,
        id: i64,
        status: UploadStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM uploads WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let current: UploadStatus = current
            .ok_or_else(|| Error::NotFound(format!("upload {}", id)))?
            .parse()?;

        if !current.can_transition_to(status) {
            return Err(Error::domain(format!(
                "upload {} cannot move from {} to {}",
                id, current, status
            )));
        }

        let message = if status == UploadStatus::Failed {
            error_message
        } else {
            None
        };
        conn.execute(
            "UPDATE uploads SET status = ?, error_message = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), message, id],
        )?;
        debug!(id, from = %current, to = %status, "Upload status changed");
        Ok(())
    }

    /// Delete an upload together with its transactions, their
    /// classifications and reconciliation results
    pub fn delete_upload(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM uploads WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("upload {}", id)));
        }
        Ok(())
    }

    fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<Upload> {
        Ok(Upload {
            id: row.get(0)?,
            upload_type: parse_column(row, 1)?,
            original_filename: row.get(2)?,
            stored_filename: row.get(3)?,
            mime_type: row.get(4)?,
            size_bytes: row.get(5)?,
            content_hash: row.get(6)?,
            uploaded_by: row.get(7)?,
            statement_period_start: parse_optional_column(row, 8)?,
            statement_period_end: parse_optional_column(row, 9)?,
            status: parse_column(row, 10)?,
            error_message: row.get(11)?,
            created_at: parse_datetime_column(row, 12)?,
            updated_at: parse_datetime_column(row, 13)?,
        })
    }
}
