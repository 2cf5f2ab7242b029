//! Report snapshot operations (append-only)

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::{parse_column, parse_date_column, parse_datetime_column, parse_json_column, Database};
use crate::error::{constraint_error, Result};
use crate::models::*;

const REPORT_COLUMNS: &str = "id, report_type, period_start, period_end, reconciliation_run_id, \
     parameters, payload, generated_by, generated_at";

impl Database {
    /// Store a snapshot. One snapshot per (type, period); a second one is a
    /// `UniquenessViolation`.
    pub fn insert_report(&self, report: &NewReport) -> Result<i64> {
        report.validate()?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO reports (report_type, period_start, period_end, reconciliation_run_id,
                                 parameters, payload, generated_by)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                report.report_type.as_str(),
                report.period_start.to_string(),
                report.period_end.to_string(),
                report.reconciliation_run_id,
                serde_json::to_string(&report.parameters)?,
                serde_json::to_string(&report.payload)?,
                report.generated_by,
            ],
        )
        .map_err(|e| constraint_error(e, "report"))?;
        let id = conn.last_insert_rowid();
        info!(
            id,
            report_type = %report.report_type,
            start = %report.period_start,
            end = %report.period_end,
            "Report snapshot stored"
        );
        Ok(id)
    }

    /// Snapshot for an exact period
    pub fn get_report(
        &self,
        report_type: ReportType,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Option<Report>> {
        let conn = self.conn()?;
        let report = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reports WHERE report_type = ? AND period_start = ? AND period_end = ?",
                    REPORT_COLUMNS
                ),
                params![
                    report_type.as_str(),
                    period_start.to_string(),
                    period_end.to_string()
                ],
                Self::row_to_report,
            )
            .optional()?;
        Ok(report)
    }

    /// Snapshots of one type, most recent period first
    pub fn list_reports(&self, report_type: Option<ReportType>) -> Result<Vec<Report>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM reports
            WHERE (?1 IS NULL OR report_type = ?1)
            ORDER BY period_end DESC, period_start DESC, id DESC
            "#,
            REPORT_COLUMNS
        ))?;
        let reports = stmt
            .query_map(
                params![report_type.map(|t| t.as_str())],
                Self::row_to_report,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// Most recently generated snapshot of a type
    pub fn latest_report(&self, report_type: ReportType) -> Result<Option<Report>> {
        let conn = self.conn()?;
        let report = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reports WHERE report_type = ? ORDER BY generated_at DESC, id DESC LIMIT 1",
                    REPORT_COLUMNS
                ),
                params![report_type.as_str()],
                Self::row_to_report,
            )
            .optional()?;
        Ok(report)
    }

    fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<Report> {
        Ok(Report {
            id: row.get(0)?,
            report_type: parse_column(row, 1)?,
            period_start: parse_date_column(row, 2)?,
            period_end: parse_date_column(row, 3)?,
            reconciliation_run_id: row.get(4)?,
            parameters: parse_json_column(row, 5)?,
            payload: parse_json_column(row, 6)?,
            generated_by: row.get(7)?,
            generated_at: parse_datetime_column(row, 8)?,
        })
    }
}
