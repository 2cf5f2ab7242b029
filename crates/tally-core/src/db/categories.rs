//! Chart of accounts operations

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{parse_column, parse_datetime_column, Database};
use crate::category_tree::CategoryTree;
use crate::error::{constraint_error, Error, Result};
use crate::models::*;

const CATEGORY_COLUMNS: &str =
    "id, code, name_th, name_en, category_type, parent_id, description, created_at, updated_at";

impl Database {
    /// Create a category; a taken code or a name already used at the same
    /// level (siblings, or other roots) is a `UniquenessViolation`
    pub fn create_category(&self, category: &NewCategory) -> Result<i64> {
        category.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::check_root_name(&tx, category)?;
        tx.execute(
            r#"
            INSERT INTO thai_accounting_categories
                (code, name_th, name_en, category_type, parent_id, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                category.code,
                category.name_th,
                category.name_en,
                category.category_type.as_str(),
                category.parent_id,
                category.description,
            ],
        )
        .map_err(|e| constraint_error(e, "category"))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Insert or refresh a category keyed on `code`
    ///
    /// Re-parenting a category under itself or one of its descendants is
    /// rejected before anything is written.
    pub fn upsert_category(&self, category: &NewCategory) -> Result<i64> {
        category.validate()?;

        if let (Some(existing), Some(parent_id)) =
            (self.get_category_by_code(&category.code)?, category.parent_id)
        {
            let tree = self.category_tree()?;
            if parent_id == existing.id || tree.is_descendant(parent_id, existing.id) {
                return Err(Error::domain(format!(
                    "category {} cannot be moved under its own subtree",
                    category.code
                )));
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::check_root_name(&tx, category)?;
        let id = tx
            .query_row(
                r#"
                INSERT INTO thai_accounting_categories
                    (code, name_th, name_en, category_type, parent_id, description)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(code) DO UPDATE SET
                    name_th = excluded.name_th,
                    name_en = excluded.name_en,
                    category_type = excluded.category_type,
                    parent_id = excluded.parent_id,
                    description = excluded.description,
                    updated_at = CURRENT_TIMESTAMP
                RETURNING id
                "#,
                params![
                    category.code,
                    category.name_th,
                    category.name_en,
                    category.category_type.as_str(),
                    category.parent_id,
                    category.description,
                ],
                |row| row.get(0),
            )
            .map_err(|e| constraint_error(e, "category"))?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                &format!(
                    "SELECT {} FROM thai_accounting_categories WHERE id = ?",
                    CATEGORY_COLUMNS
                ),
                params![id],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    pub fn get_category_by_code(&self, code: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                &format!(
                    "SELECT {} FROM thai_accounting_categories WHERE code = ?",
                    CATEGORY_COLUMNS
                ),
                params![code.trim()],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// All categories ordered by code
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM thai_accounting_categories ORDER BY code",
            CATEGORY_COLUMNS
        ))?;
        let categories = stmt
            .query_map([], Self::row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Load the whole chart of accounts as a tree
    pub fn category_tree(&self) -> Result<CategoryTree> {
        CategoryTree::build(self.list_categories()?)
    }

    /// Delete a category
    ///
    /// Children become roots, even when that leaves two roots with the same
    /// Thai name; vendors and classifications that pointed at it keep their
    /// rows with the reference cleared.
    pub fn delete_category(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM thai_accounting_categories WHERE id = ?",
                params![id],
            )
            .map_err(|e| constraint_error(e, "category"))?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("category {}", id)));
        }
        Ok(())
    }

    /// Reject a new or renamed root whose Thai name another root already has
    ///
    /// The unique index covers siblings only, since SQLite treats NULL parents
    /// as distinct. Callers hold an immediate transaction so the check and
    /// the write can't interleave with another writer.
    fn check_root_name(conn: &Connection, category: &NewCategory) -> Result<()> {
        if category.parent_id.is_some() {
            return Ok(());
        }
        let taken: bool = conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM thai_accounting_categories
                WHERE parent_id IS NULL AND name_th = ? AND code != ?
            )
            "#,
            params![category.name_th, category.code],
            |row| row.get(0),
        )?;
        if taken {
            return Err(Error::UniquenessViolation {
                entity: "category",
                detail: format!("a root category named {} already exists", category.name_th),
            });
        }
        Ok(())
    }

    fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            code: row.get(1)?,
            name_th: row.get(2)?,
            name_en: row.get(3)?,
            category_type: parse_column(row, 4)?,
            parent_id: row.get(5)?,
            description: row.get(6)?,
            created_at: parse_datetime_column(row, 7)?,
            updated_at: parse_datetime_column(row, 8)?,
        })
    }
}
