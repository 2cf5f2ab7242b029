//! Reconciliation run and result operations
//!
//! Runs are created `running`, finish exactly once, and are frozen after
//! that (the store rejects updates with a trigger as well).

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::{
    parse_column, parse_datetime_column, parse_json_column, parse_optional_column,
    parse_optional_datetime_column, Database,
};
use crate::error::{constraint_error, Error, Result};
use crate::models::*;

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, strategy, parameters, status, created_by, notes";

const RESULT_COLUMNS: &str =
    "id, run_id, transaction_id, matched_upload_id, match_status, match_score, notes, created_at";

impl Database {
    pub fn start_reconciliation_run(&self, run: &NewReconciliationRun) -> Result<i64> {
        run.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reconciliation_runs (strategy, parameters, created_by, notes) VALUES (?, ?, ?, ?)",
            params![
                run.strategy.as_str(),
                serde_json::to_string(&run.parameters)?,
                run.created_by,
                run.notes,
            ],
        )
        .map_err(|e| constraint_error(e, "reconciliation run"))?;
        let id = conn.last_insert_rowid();
        info!(id, strategy = %run.strategy, "Reconciliation run started");
        Ok(id)
    }

    /// Close a running run as `completed` or `failed`
    ///
    /// `notes`, when given, replaces the run's notes.
    pub fn finish_reconciliation_run(
        &self,
        id: i64,
        status: RunStatus,
        notes: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::domain(format!(
                "a run can only finish as completed or failed, not {}",
                status
            )));
        }

        let conn = self.conn()?;
        let current = Self::run_status(&conn, id)?;
        if current != RunStatus::Running {
            return Err(Error::InvalidState(format!(
                "reconciliation run {} already {}",
                id, current
            )));
        }

        conn.execute(
            r#"
            UPDATE reconciliation_runs
            SET status = ?, finished_at = CURRENT_TIMESTAMP, notes = COALESCE(?, notes)
            WHERE id = ?
            "#,
            params![status.as_str(), notes, id],
        )
        .map_err(|e| constraint_error(e, "reconciliation run"))?;
        info!(id, status = %status, "Reconciliation run finished");
        Ok(())
    }

    pub fn get_reconciliation_run(&self, id: i64) -> Result<Option<ReconciliationRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reconciliation_runs WHERE id = ?",
                    RUN_COLUMNS
                ),
                params![id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Runs, newest first, optionally filtered by status
    pub fn list_reconciliation_runs(
        &self,
        status: Option<RunStatus>,
    ) -> Result<Vec<ReconciliationRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reconciliation_runs WHERE (?1 IS NULL OR status = ?1) ORDER BY id DESC",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![status.map(|s| s.as_str())], Self::row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Record the outcome for one transaction within a running run
    pub fn record_reconciliation_result(&self, result: &NewReconciliationResult) -> Result<i64> {
        result.validate()?;
        let conn = self.conn()?;

        let status = Self::run_status(&conn, result.run_id).map_err(|e| match e {
            Error::NotFound(what) => {
                Error::ReferentialIntegrity(format!("{} does not exist", what))
            }
            other => other,
        })?;
        if status != RunStatus::Running {
            return Err(Error::InvalidState(format!(
                "reconciliation run {} is {}; results can only be added while running",
                result.run_id, status
            )));
        }

        if let Some(upload_id) = result.matched_upload_id {
            let upload_type: Option<String> = conn
                .query_row(
                    "SELECT upload_type FROM uploads WHERE id = ?",
                    params![upload_id],
                    |row| row.get(0),
                )
                .optional()?;
            let upload_type: UploadType = upload_type
                .ok_or_else(|| {
                    Error::ReferentialIntegrity(format!("matched upload {} does not exist", upload_id))
                })?
                .parse()?;
            if upload_type != UploadType::Receipt {
                return Err(Error::domain(format!(
                    "matched upload {} is a {}, not a receipt",
                    upload_id, upload_type
                )));
            }
        }

        conn.execute(
            r#"
            INSERT INTO reconciliation_results (run_id, transaction_id, matched_upload_id,
                                                match_status, match_score, notes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                result.run_id,
                result.transaction_id,
                result.matched_upload_id,
                result.match_status.as_str(),
                result.match_score.map(|s| s.to_string()),
                result.notes,
            ],
        )
        .map_err(|e| constraint_error(e, "reconciliation result"))?;
        let id = conn.last_insert_rowid();
        debug!(
            run_id = result.run_id,
            transaction_id = result.transaction_id,
            status = %result.match_status,
            "Recorded reconciliation result"
        );
        Ok(id)
    }

    pub fn list_reconciliation_results(&self, run_id: i64) -> Result<Vec<ReconciliationResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reconciliation_results WHERE run_id = ? ORDER BY transaction_id",
            RESULT_COLUMNS
        ))?;
        let results = stmt
            .query_map(params![run_id], Self::row_to_result)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }

    /// Delete a run and all of its results; reports built from it keep
    /// their snapshot with the run reference cleared
    pub fn delete_reconciliation_run(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM reconciliation_runs WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("reconciliation run {}", id)));
        }
        Ok(())
    }

    fn run_status(conn: &rusqlite::Connection, id: i64) -> Result<RunStatus> {
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM reconciliation_runs WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        status
            .ok_or_else(|| Error::NotFound(format!("reconciliation run {}", id)))?
            .parse()
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<ReconciliationRun> {
        Ok(ReconciliationRun {
            id: row.get(0)?,
            started_at: parse_datetime_column(row, 1)?,
            finished_at: parse_optional_datetime_column(row, 2)?,
            strategy: parse_column(row, 3)?,
            parameters: parse_json_column(row, 4)?,
            status: parse_column(row, 5)?,
            created_by: row.get(6)?,
            notes: row.get(7)?,
        })
    }

    fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<ReconciliationResult> {
        Ok(ReconciliationResult {
            id: row.get(0)?,
            run_id: row.get(1)?,
            transaction_id: row.get(2)?,
            matched_upload_id: row.get(3)?,
            match_status: parse_column(row, 4)?,
            match_score: parse_optional_column(row, 5)?,
            notes: row.get(6)?,
            created_at: parse_datetime_column(row, 7)?,
        })
    }
}
