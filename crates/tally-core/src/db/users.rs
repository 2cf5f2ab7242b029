//! User operations

use rusqlite::{params, OptionalExtension};

use super::{parse_column, parse_datetime_column, Database};
use crate::error::{constraint_error, Error, Result};
use crate::models::*;

const USER_COLUMNS: &str = "id, email, full_name, role, is_active, created_at, updated_at";

impl Database {
    /// Create a user; a taken email is a `UniquenessViolation`
    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        user.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (email, full_name, role) VALUES (?, ?, ?)",
            params![user.email, user.full_name, user.role.as_str()],
        )
        .map_err(|e| constraint_error(e, "user"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert or refresh a user keyed on email
    ///
    /// Only `full_name` and `role` are overwritten; `is_active` is left alone.
    pub fn upsert_user(&self, user: &NewUser) -> Result<i64> {
        user.validate()?;
        let conn = self.conn()?;
        let id = conn
            .query_row(
                r#"
                INSERT INTO users (email, full_name, role) VALUES (?1, ?2, ?3)
                ON CONFLICT(email) DO UPDATE SET
                    full_name = excluded.full_name,
                    role = excluded.role,
                    updated_at = CURRENT_TIMESTAMP
                RETURNING id
                "#,
                params![user.email, user.full_name, user.role.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| constraint_error(e, "user"))?;
        Ok(id)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
                params![email.trim().to_lowercase()],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List users, optionally including deactivated ones
    pub fn list_users(&self, include_inactive: bool) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let sql = if include_inactive {
            format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM users WHERE is_active = 1 ORDER BY email",
                USER_COLUMNS
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Soft-enable or disable a user. Users are never hard-deleted.
    pub fn set_user_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            role: parse_column(row, 3)?,
            is_active: row.get(4)?,
            created_at: parse_datetime_column(row, 5)?,
            updated_at: parse_datetime_column(row, 6)?,
        })
    }
}
