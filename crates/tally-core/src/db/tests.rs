//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::{SEED_CATEGORIES, SEED_DEMO_USERS, SEED_VENDORS};
    use crate::test_utils::{date, seeded_db, LedgerFixture};
    use rusqlite::params;
    use rust_decimal_macros::dec;

    fn fresh_store() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let db = Database::connect(path.to_str().unwrap(), None).unwrap();
        (dir, db)
    }

    fn count(db: &Database, table: &str) -> i64 {
        let conn = db.conn().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    // ========== Apply ==========

    #[test]
    fn test_apply_on_fresh_store() {
        let (_dir, db) = fresh_store();
        assert_eq!(db.schema_version().unwrap(), 0);
        assert_eq!(db.pending_migrations().unwrap().len(), MIGRATIONS.len());

        let report = db.apply().unwrap();
        assert_eq!(report.migrations_applied, vec![1, 2, 3, 4, 5]);
        assert!(report.statements_executed > 0);
        assert_eq!(report.seed_sets.len(), 3);
        assert_eq!(
            report.seed_rows_changed(),
            SEED_CATEGORIES.len() + SEED_VENDORS.len() + SEED_DEMO_USERS.len()
        );

        assert_eq!(db.schema_version().unwrap(), migrations::latest_version());
        assert!(db.pending_migrations().unwrap().is_empty());
        assert_eq!(db.applied_migrations().unwrap().len(), MIGRATIONS.len());
    }

    #[test]
    fn test_apply_twice_keeps_row_counts() {
        let db = Database::in_memory().unwrap();
        db.apply().unwrap();
        let categories = count(&db, "thai_accounting_categories");
        let vendors = count(&db, "vendors");
        let users = count(&db, "users");

        let second = db.apply().unwrap();
        assert!(second.is_noop());
        assert_eq!(second.seed_rows_changed(), 0);
        assert_eq!(count(&db, "thai_accounting_categories"), categories);
        assert_eq!(count(&db, "vendors"), vendors);
        assert_eq!(count(&db, "users"), users);
        assert_eq!(categories, SEED_CATEGORIES.len() as i64);
        assert_eq!(vendors, SEED_VENDORS.len() as i64);
    }

    #[test]
    fn test_apply_restores_drifted_seed_rows() {
        let db = seeded_db();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "UPDATE thai_accounting_categories SET name_en = 'Renting' WHERE code = '6200'",
                [],
            )
            .unwrap();
        }

        let report = db.apply().unwrap();
        assert_eq!(report.seed_rows_changed(), 1);
        let rent = db.get_category_by_code("6200").unwrap().unwrap();
        assert_eq!(rent.name_en.as_deref(), Some("Rent"));
    }

    #[test]
    fn test_apply_keeps_user_data() {
        let fx = LedgerFixture::new();
        fx.db.apply().unwrap();
        assert_eq!(fx.count("uploads"), 2);
        assert_eq!(fx.count("transactions"), 3);
    }

    #[test]
    fn test_apply_without_demo_users() {
        let db = Database::in_memory().unwrap();
        let report = db
            .apply_with(&SeedOptions { demo_users: false })
            .unwrap();
        assert_eq!(report.seed_sets.len(), 2);
        assert_eq!(count(&db, "users"), 0);
    }

    #[test]
    fn test_table_counts() {
        let fx = LedgerFixture::new();
        let counts = fx.db.table_counts().unwrap();
        assert_eq!(counts.len(), LEDGER_TABLES.len());
        let rows = |table: &str| counts.iter().find(|c| c.table == table).unwrap().rows;
        assert_eq!(rows("transactions"), 3);
        assert_eq!(rows("uploads"), 2);
        assert_eq!(rows("reports"), 0);
    }

    #[test]
    fn test_foreign_keys_enabled_on_every_pooled_connection() {
        let db = Database::in_memory().unwrap();
        // Hold several connections at once so the pool hands out distinct ones
        let conns: Vec<_> = (0..3).map(|_| db.conn().unwrap()).collect();
        for conn in &conns {
            let fk: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert_eq!(fk, 1);
        }
    }

    // ========== Store-level constraints ==========

    #[test]
    fn test_enum_checks_reject_raw_inserts() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        assert!(conn
            .execute(
                "INSERT INTO users (email, full_name, role) VALUES ('a@b.co', 'A', 'owner')",
                []
            )
            .is_err());
        assert!(conn
            .execute(
                "INSERT INTO uploads (upload_type, original_filename) VALUES ('photo', 'x.jpg')",
                []
            )
            .is_err());
        assert!(conn
            .execute(
                "INSERT INTO thai_accounting_categories (code, name_th, category_type) VALUES ('9', 'x', 'other')",
                []
            )
            .is_err());
    }

    #[test]
    fn test_amount_and_confidence_checks() {
        let fx = LedgerFixture::new();
        let conn = fx.db.conn().unwrap();

        let err = conn
            .execute(
                "INSERT INTO transactions (source_upload_id, txn_date, amount, description) VALUES (?, '2024-03-01', '1.5', 'x')",
                params![fx.statement_id],
            )
            .unwrap_err();
        assert!(matches!(
            crate::error::constraint_error(err, "transaction"),
            Error::Domain(_)
        ));

        let err = conn
            .execute(
                "INSERT INTO classifications (transaction_id, source, confidence) VALUES (?, 'ai', '1.5')",
                params![fx.transaction_ids[0]],
            )
            .unwrap_err();
        assert!(matches!(
            crate::error::constraint_error(err, "classification"),
            Error::Domain(_)
        ));
    }

    // ========== Users ==========

    #[test]
    fn test_user_crud() {
        let db = Database::in_memory().unwrap();
        let user = NewUser::new("Somchai@Example.com", "Somchai Jaidee", UserRole::Accountant)
            .unwrap();
        let id = db.create_user(&user).unwrap();

        let fetched = db.get_user_by_email("somchai@example.com").unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.role, UserRole::Accountant);
        assert!(fetched.is_active);

        let err = db.create_user(&user).unwrap_err();
        assert!(matches!(
            err,
            Error::UniquenessViolation { entity: "user", .. }
        ));
    }

    #[test]
    fn test_upsert_user_keeps_active_flag() {
        let db = Database::in_memory().unwrap();
        let id = db
            .upsert_user(&NewUser::new("a@tally.local", "A", UserRole::User).unwrap())
            .unwrap();
        db.set_user_active(id, false).unwrap();

        let again = db
            .upsert_user(&NewUser::new("a@tally.local", "A Renamed", UserRole::Admin).unwrap())
            .unwrap();
        assert_eq!(again, id);

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.full_name, "A Renamed");
        assert_eq!(user.role, UserRole::Admin);
        assert!(!user.is_active);

        assert!(db.list_users(false).unwrap().is_empty());
        assert_eq!(db.list_users(true).unwrap().len(), 1);
        assert!(matches!(
            db.set_user_active(9999, true),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_deleting_user_nulls_references() {
        let fx = LedgerFixture::new();
        let admin = fx.user("admin@tally.local");

        let mut upload = NewUpload::new(UploadType::Receipt, "r.jpg");
        upload.uploaded_by = Some(admin);
        let upload_id = fx.db.create_upload(&upload).unwrap();

        let mut run = NewReconciliationRun::new(RunStrategy::Manual);
        run.created_by = Some(admin);
        let run_id = fx.db.start_reconciliation_run(&run).unwrap();
        fx.db
            .finish_reconciliation_run(run_id, RunStatus::Completed, None)
            .unwrap();

        {
            let conn = fx.db.conn().unwrap();
            conn.execute("DELETE FROM users WHERE id = ?", params![admin])
                .unwrap();
        }

        assert_eq!(fx.db.get_upload(upload_id).unwrap().unwrap().uploaded_by, None);
        // Finished runs are frozen, but the creator reference can still clear
        let run = fx.db.get_reconciliation_run(run_id).unwrap().unwrap();
        assert_eq!(run.created_by, None);
        assert_eq!(run.status, RunStatus::Completed);
    }

    // ========== Uploads ==========

    #[test]
    fn test_upload_roundtrip_and_hash_lookup() {
        let fx = LedgerFixture::new();
        let upload = fx.db.get_upload(fx.statement_id).unwrap().unwrap();
        assert_eq!(upload.upload_type, UploadType::BankStatement);
        assert_eq!(upload.status, UploadStatus::Uploaded);
        assert_eq!(upload.statement_period_start, Some(date(2024, 3, 1)));
        assert_eq!(upload.size_bytes, Some(b"statement bytes".len() as i64));

        let hash = content_hash(b"statement bytes");
        let found = fx.db.find_upload_by_hash(&hash).unwrap().unwrap();
        assert_eq!(found.id, fx.statement_id);
        assert!(fx
            .db
            .find_upload_by_hash(&content_hash(b"other"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_upload_status_lifecycle() {
        let fx = LedgerFixture::new();
        let id = fx.statement_id;

        let err = fx
            .db
            .update_upload_status(id, UploadStatus::Processed, None)
            .unwrap_err();
        assert!(matches!(err, Error::Domain(_)));

        fx.db
            .update_upload_status(id, UploadStatus::Processing, None)
            .unwrap();
        fx.db
            .update_upload_status(id, UploadStatus::Failed, Some("unreadable PDF"))
            .unwrap();
        let failed = fx.db.get_upload(id).unwrap().unwrap();
        assert_eq!(failed.status, UploadStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("unreadable PDF"));

        fx.db
            .update_upload_status(id, UploadStatus::Processing, Some("ignored"))
            .unwrap();
        let retried = fx.db.get_upload(id).unwrap().unwrap();
        assert_eq!(retried.error_message, None);

        assert_eq!(
            fx.db.list_uploads(Some(UploadStatus::Processing)).unwrap().len(),
            1
        );
        assert_eq!(fx.db.list_uploads(None).unwrap().len(), 2);
        assert!(matches!(
            fx.db.update_upload_status(9999, UploadStatus::Processing, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_upload_rejected_before_sql() {
        let db = Database::in_memory().unwrap();
        let mut upload = NewUpload::new(UploadType::Other, "x.csv");
        upload.content_hash = Some("not-a-hash".into());
        assert!(matches!(db.create_upload(&upload), Err(Error::Domain(_))));
        assert_eq!(count(&db, "uploads"), 0);
    }

    // ========== Categories ==========

    #[test]
    fn test_seeded_category_tree() {
        let db = seeded_db();
        let tree = db.category_tree().unwrap();
        assert_eq!(tree.len(), SEED_CATEGORIES.len());

        let roots: Vec<&str> = tree.roots().map(|c| c.code.as_str()).collect();
        assert_eq!(
            roots,
            vec!["1000", "2000", "3000", "4000", "5000", "6000", "7000"]
        );

        let rent = db.get_category_by_code("6200").unwrap().unwrap();
        assert_eq!(rent.category_type, CategoryType::Expense);
        assert_eq!(tree.parent(rent.id).unwrap().code, "6000");
    }

    #[test]
    fn test_category_uniqueness() {
        let db = seeded_db();
        let expenses = db.get_category_by_code("6000").unwrap().unwrap();

        let dup_code = NewCategory::new("6200", "อื่นๆ", CategoryType::Expense);
        assert!(matches!(
            db.create_category(&dup_code),
            Err(Error::UniquenessViolation { entity: "category", .. })
        ));

        let mut dup_sibling = NewCategory::new("6999", "ค่าเช่า", CategoryType::Expense);
        dup_sibling.parent_id = Some(expenses.id);
        assert!(matches!(
            db.create_category(&dup_sibling),
            Err(Error::UniquenessViolation { .. })
        ));

        // Same Thai name under a different parent is fine
        let income = db.get_category_by_code("4000").unwrap().unwrap();
        let mut cousin = NewCategory::new("4300", "ค่าเช่า", CategoryType::Income);
        cousin.parent_id = Some(income.id);
        db.create_category(&cousin).unwrap();

        // Roots compare as one group
        let dup_root = NewCategory::new("8000", "รายได้", CategoryType::Income);
        assert!(matches!(
            db.create_category(&dup_root),
            Err(Error::UniquenessViolation { .. })
        ));
    }

    #[test]
    fn test_upsert_category() {
        let db = seeded_db();
        let before = db.get_category_by_code("6500").unwrap().unwrap();

        let mut update = NewCategory::new("6500", "ค่าโฆษณาและส่งเสริมการขาย", CategoryType::Expense);
        update.name_en = Some("Advertising and promotion".into());
        update.parent_id = before.parent_id;
        let id = db.upsert_category(&update).unwrap();
        assert_eq!(id, before.id);

        let after = db.get_category(id).unwrap().unwrap();
        assert_eq!(after.name_en.as_deref(), Some("Advertising and promotion"));
        assert_eq!(
            count(&db, "thai_accounting_categories"),
            SEED_CATEGORIES.len() as i64
        );

        let fresh = db
            .upsert_category(&NewCategory::new("9000", "อื่นๆ", CategoryType::Expense))
            .unwrap();
        assert_ne!(fresh, id);
    }

    #[test]
    fn test_upsert_category_rejects_cycles() {
        let db = seeded_db();
        let expenses = db.get_category_by_code("6000").unwrap().unwrap();
        let rent = db.get_category_by_code("6200").unwrap().unwrap();

        let mut move_under_child = NewCategory::new("6000", "ค่าใช้จ่าย", CategoryType::Expense);
        move_under_child.parent_id = Some(rent.id);
        assert!(matches!(
            db.upsert_category(&move_under_child),
            Err(Error::Domain(_))
        ));

        let mut move_under_self = NewCategory::new("6000", "ค่าใช้จ่าย", CategoryType::Expense);
        move_under_self.parent_id = Some(expenses.id);
        assert!(matches!(
            db.upsert_category(&move_under_self),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn test_delete_category_nulls_references() {
        let fx = LedgerFixture::new();
        let utilities = fx.category("6300");
        let ais = fx.vendor("AIS");

        let mut c = NewClassification::new(fx.transaction_ids[0], ClassificationSource::Rule);
        c.category_id = Some(utilities);
        c.vendor_id = Some(ais);
        fx.db.insert_classification(&c).unwrap();

        fx.db.delete_category(utilities).unwrap();

        assert_eq!(fx.db.get_vendor(ais).unwrap().unwrap().default_category_id, None);
        let kept = fx
            .db
            .get_classification_for_transaction(fx.transaction_ids[0])
            .unwrap()
            .unwrap();
        assert_eq!(kept.category_id, None);
        assert_eq!(kept.vendor_id, Some(ais));
        assert!(matches!(
            fx.db.delete_category(utilities),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_parent_category_orphans_children_as_roots() {
        let db = seeded_db();
        let tax = db.get_category_by_code("7000").unwrap().unwrap();
        db.delete_category(tax.id).unwrap();

        let vat = db.get_category_by_code("7100").unwrap().unwrap();
        assert_eq!(vat.parent_id, None);
        let tree = db.category_tree().unwrap();
        assert!(tree.roots().any(|c| c.code == "7100"));
    }

    #[test]
    fn test_delete_parents_whose_children_share_a_name() {
        let db = seeded_db();
        let income = db.get_category_by_code("4000").unwrap().unwrap();
        let expenses = db.get_category_by_code("6000").unwrap().unwrap();

        let mut other_income = NewCategory::new("4990", "อื่นๆ", CategoryType::Income);
        other_income.parent_id = Some(income.id);
        db.create_category(&other_income).unwrap();
        let mut other_expense = NewCategory::new("6990", "อื่นๆ", CategoryType::Expense);
        other_expense.parent_id = Some(expenses.id);
        db.create_category(&other_expense).unwrap();

        db.delete_category(income.id).unwrap();
        db.delete_category(expenses.id).unwrap();

        let a = db.get_category_by_code("4990").unwrap().unwrap();
        let b = db.get_category_by_code("6990").unwrap().unwrap();
        assert_eq!(a.parent_id, None);
        assert_eq!(b.parent_id, None);
        assert_eq!(a.name_th, b.name_th);

        // New roots still can't reuse the name
        let third = NewCategory::new("8990", "อื่นๆ", CategoryType::Expense);
        assert!(matches!(
            db.create_category(&third),
            Err(Error::UniquenessViolation { entity: "category", .. })
        ));
        assert!(matches!(
            db.upsert_category(&third),
            Err(Error::UniquenessViolation { entity: "category", .. })
        ));
        // Refreshing a root by its own code is not a collision
        let cogs = db.get_category_by_code("5000").unwrap().unwrap();
        let refreshed = db
            .upsert_category(&NewCategory::new("5000", "ต้นทุนขาย", CategoryType::Cogs))
            .unwrap();
        assert_eq!(refreshed, cogs.id);
    }

    // ========== Vendors ==========

    #[test]
    fn test_vendor_crud() {
        let db = seeded_db();
        let rent = db.get_category_by_code("6200").unwrap().unwrap();

        let mut vendor = NewVendor::new("Central Pattana");
        vendor.default_category_id = Some(rent.id);
        let id = db.create_vendor(&vendor).unwrap();
        assert!(matches!(
            db.create_vendor(&vendor),
            Err(Error::UniquenessViolation { entity: "vendor", .. })
        ));

        vendor.default_category_id = None;
        assert_eq!(db.upsert_vendor(&vendor).unwrap(), id);
        assert_eq!(db.get_vendor(id).unwrap().unwrap().default_category_id, None);

        let mut bad = NewVendor::new("Nowhere Ltd");
        bad.default_category_id = Some(999_999);
        assert!(matches!(
            db.create_vendor(&bad),
            Err(Error::ReferentialIntegrity(_))
        ));

        assert_eq!(db.list_vendors().unwrap().len(), SEED_VENDORS.len() + 1);
        db.delete_vendor(id).unwrap();
        assert!(db.get_vendor_by_name("Central Pattana").unwrap().is_none());
    }

    #[test]
    fn test_delete_vendor_nulls_classification() {
        let fx = LedgerFixture::new();
        let seven = fx.vendor("7-Eleven");
        let mut c = NewClassification::new(fx.transaction_ids[1], ClassificationSource::Ai);
        c.vendor_id = Some(seven);
        c.confidence = Some(Confidence::new(dec!(0.9125)).unwrap());
        fx.db.insert_classification(&c).unwrap();

        fx.db.delete_vendor(seven).unwrap();

        let kept = fx
            .db
            .get_classification_for_transaction(fx.transaction_ids[1])
            .unwrap()
            .unwrap();
        assert_eq!(kept.vendor_id, None);
        assert_eq!(kept.confidence.unwrap().value(), dec!(0.9125));
    }

    // ========== Transactions ==========

    #[test]
    fn test_amount_stored_with_two_decimals() {
        let fx = LedgerFixture::new();
        let txn = NewTransaction::new(
            fx.statement_id,
            date(2024, 3, 25),
            "12.5".parse().unwrap(),
            "Grab ride",
        );
        let id = fx.db.insert_transaction(&txn).unwrap();

        let raw: String = fx
            .db
            .conn()
            .unwrap()
            .query_row("SELECT amount FROM transactions WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(raw, "12.50");

        let stored = fx.db.get_transaction(id).unwrap().unwrap();
        assert_eq!(stored.amount.value(), dec!(12.50));
        assert_eq!(stored.currency, "THB");
    }

    #[test]
    fn test_posted_at_keeps_sub_second_precision() {
        let fx = LedgerFixture::new();
        let posted = date(2024, 3, 25)
            .and_hms_micro_opt(14, 30, 5, 123_456)
            .unwrap()
            .and_utc();
        let mut txn = NewTransaction::new(
            fx.statement_id,
            date(2024, 3, 25),
            Amount::from_minor_units(-8_900),
            "Grab ride",
        );
        txn.posted_at = Some(posted);
        let id = fx.db.insert_transaction(&txn).unwrap();

        let stored = fx.db.get_transaction(id).unwrap().unwrap();
        assert_eq!(stored.posted_at, Some(posted));
    }

    #[test]
    fn test_unreadable_timestamp_is_an_error() {
        let db = seeded_db();
        let vendor = db.get_vendor_by_name("Makro").unwrap().unwrap();
        db.conn()
            .unwrap()
            .execute(
                "UPDATE vendors SET created_at = 'last tuesday' WHERE id = ?",
                params![vendor.id],
            )
            .unwrap();

        assert!(matches!(db.get_vendor(vendor.id), Err(Error::Database(_))));
    }

    #[test]
    fn test_transaction_with_unknown_upload_rejected() {
        let db = Database::in_memory().unwrap();
        let txn = NewTransaction::new(
            424242,
            date(2024, 1, 1),
            Amount::from_minor_units(100),
            "orphan",
        );
        assert!(matches!(
            db.insert_transaction(&txn),
            Err(Error::ReferentialIntegrity(_))
        ));
    }

    #[test]
    fn test_transaction_upload_is_immutable() {
        let fx = LedgerFixture::new();
        let conn = fx.db.conn().unwrap();
        let err = conn
            .execute(
                "UPDATE transactions SET source_upload_id = ? WHERE id = ?",
                params![fx.receipt_id, fx.transaction_ids[0]],
            )
            .unwrap_err();
        assert!(matches!(
            crate::error::constraint_error(err, "transaction"),
            Error::InvalidState(_)
        ));
    }

    #[test]
    fn test_list_and_count_transactions() {
        let fx = LedgerFixture::new();
        let txns = fx.db.list_transactions_for_upload(fx.statement_id).unwrap();
        assert_eq!(txns.len(), 3);
        assert!(txns.windows(2).all(|w| w[0].txn_date <= w[1].txn_date));
        assert_eq!(txns[0].amount, Amount::from_minor_units(-45_000));

        assert_eq!(fx.db.count_transactions(None).unwrap(), 3);
        assert_eq!(fx.db.count_transactions(Some(fx.receipt_id)).unwrap(), 0);
    }

    #[test]
    fn test_delete_upload_cascades() {
        let fx = LedgerFixture::new();
        let txn = fx.transaction_ids[0];
        fx.db
            .insert_classification(&NewClassification::new(txn, ClassificationSource::Manual))
            .unwrap();
        let run = fx
            .db
            .start_reconciliation_run(&NewReconciliationRun::new(RunStrategy::Fuzzy))
            .unwrap();
        fx.db
            .record_reconciliation_result(&NewReconciliationResult::new(
                run,
                txn,
                MatchStatus::Unmatched,
            ))
            .unwrap();

        fx.db.delete_upload(fx.statement_id).unwrap();

        assert_eq!(fx.count("transactions"), 0);
        assert_eq!(fx.count("classifications"), 0);
        assert_eq!(fx.count("reconciliation_results"), 0);
        // The run itself is not owned by the upload
        assert_eq!(fx.count("reconciliation_runs"), 1);
        assert!(matches!(
            fx.db.delete_upload(fx.statement_id),
            Err(Error::NotFound(_))
        ));
    }

    // ========== Classifications ==========

    #[test]
    fn test_one_classification_per_transaction() {
        let fx = LedgerFixture::new();
        let txn = fx.transaction_ids[0];
        let mut c = NewClassification::new(txn, ClassificationSource::Ai);
        c.category_id = Some(fx.category("6200"));
        c.tax_tags = TaxTags::new(["wht5", "vat7"]).unwrap();
        fx.db.insert_classification(&c).unwrap();

        assert!(matches!(
            fx.db.insert_classification(&c),
            Err(Error::UniquenessViolation { entity: "classification", .. })
        ));
        assert_eq!(fx.count("classifications"), 1);

        let stored = fx.db.get_classification_for_transaction(txn).unwrap().unwrap();
        assert!(stored.tax_tags.contains("vat7"));
        assert_eq!(stored.source, ClassificationSource::Ai);
        assert!(!stored.is_override);
    }

    #[test]
    fn test_override_classification() {
        let fx = LedgerFixture::new();
        let txn = fx.transaction_ids[1];
        let accountant = fx.user("accountant@tally.local");

        let mut c = NewClassification::new(txn, ClassificationSource::Ai);
        c.category_id = Some(fx.category("6700"));
        c.confidence = Some(Confidence::new(dec!(0.42)).unwrap());
        let id = fx.db.insert_classification(&c).unwrap();

        let correction = ClassificationOverride {
            category_id: Some(fx.category("6400")),
            vendor_id: Some(fx.vendor("Grab")),
            notes: Some("taxi, not supplies".into()),
            ..Default::default()
        };
        let same = fx
            .db
            .override_classification(txn, accountant, &correction)
            .unwrap();
        assert_eq!(same, id);

        let stored = fx.db.get_classification_for_transaction(txn).unwrap().unwrap();
        assert!(stored.is_override);
        assert_eq!(stored.overridden_by, Some(accountant));
        assert_eq!(stored.source, ClassificationSource::Manual);
        assert_eq!(stored.confidence, None);
        assert_eq!(stored.category_id, Some(fx.category("6400")));

        // Overriding an unclassified transaction creates the row
        let other = fx.transaction_ids[2];
        fx.db
            .override_classification(other, accountant, &ClassificationOverride::default())
            .unwrap();
        assert_eq!(fx.count("classifications"), 2);
    }

    #[test]
    fn test_classification_validation() {
        let fx = LedgerFixture::new();
        let mut c = NewClassification::new(fx.transaction_ids[0], ClassificationSource::Rule);
        c.overridden_by = Some(fx.user("admin@tally.local"));
        assert!(matches!(fx.db.insert_classification(&c), Err(Error::Domain(_))));

        let missing = NewClassification::new(999_999, ClassificationSource::Rule);
        assert!(matches!(
            fx.db.insert_classification(&missing),
            Err(Error::ReferentialIntegrity(_))
        ));
    }

    #[test]
    fn test_list_unclassified_transactions() {
        let fx = LedgerFixture::new();
        assert_eq!(fx.db.list_unclassified_transactions(10).unwrap().len(), 3);

        fx.db
            .insert_classification(&NewClassification::new(
                fx.transaction_ids[0],
                ClassificationSource::Rule,
            ))
            .unwrap();
        let remaining = fx.db.list_unclassified_transactions(10).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|t| t.id != fx.transaction_ids[0]));
        assert_eq!(fx.db.list_unclassified_transactions(1).unwrap().len(), 1);
    }

    // ========== Reconciliation ==========

    #[test]
    fn test_reconciliation_run_lifecycle() {
        let fx = LedgerFixture::new();
        let mut run = NewReconciliationRun::new(RunStrategy::ExactAmountDate);
        run.parameters = serde_json::json!({ "date_window_days": 3 });
        let id = fx.db.start_reconciliation_run(&run).unwrap();

        let started = fx.db.get_reconciliation_run(id).unwrap().unwrap();
        assert_eq!(started.status, RunStatus::Running);
        assert!(started.finished_at.is_none());
        assert_eq!(started.parameters["date_window_days"], 3);

        assert!(matches!(
            fx.db.finish_reconciliation_run(id, RunStatus::Running, None),
            Err(Error::Domain(_))
        ));

        fx.db
            .finish_reconciliation_run(id, RunStatus::Completed, Some("3 matched"))
            .unwrap();
        let done = fx.db.get_reconciliation_run(id).unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.finished_at.is_some());
        assert_eq!(done.notes.as_deref(), Some("3 matched"));

        assert!(matches!(
            fx.db.finish_reconciliation_run(id, RunStatus::Failed, None),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(
            fx.db
                .list_reconciliation_runs(Some(RunStatus::Completed))
                .unwrap()
                .len(),
            1
        );
        assert!(fx
            .db
            .list_reconciliation_runs(Some(RunStatus::Running))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_finished_run_is_frozen_in_store() {
        let fx = LedgerFixture::new();
        let id = fx
            .db
            .start_reconciliation_run(&NewReconciliationRun::new(RunStrategy::Hybrid))
            .unwrap();
        fx.db
            .finish_reconciliation_run(id, RunStatus::Failed, None)
            .unwrap();

        let conn = fx.db.conn().unwrap();
        let err = conn
            .execute(
                "UPDATE reconciliation_runs SET status = 'running', finished_at = NULL WHERE id = ?",
                params![id],
            )
            .unwrap_err();
        assert!(matches!(
            crate::error::constraint_error(err, "reconciliation run"),
            Error::InvalidState(_)
        ));
    }

    #[test]
    fn test_reconciliation_results() {
        let fx = LedgerFixture::new();
        let run = fx
            .db
            .start_reconciliation_run(&NewReconciliationRun::new(RunStrategy::Fuzzy))
            .unwrap();
        let txn = fx.transaction_ids[1];

        let mut matched = NewReconciliationResult::new(run, txn, MatchStatus::Matched);
        matched.matched_upload_id = Some(fx.receipt_id);
        matched.match_score = Some(Confidence::new(dec!(0.87)).unwrap());
        fx.db.record_reconciliation_result(&matched).unwrap();

        // Same (run, transaction) pair again
        assert!(matches!(
            fx.db.record_reconciliation_result(&matched),
            Err(Error::UniquenessViolation { .. })
        ));

        // The same transaction in another run is fine
        let rerun = fx
            .db
            .start_reconciliation_run(&NewReconciliationRun::new(RunStrategy::Manual))
            .unwrap();
        fx.db
            .record_reconciliation_result(&NewReconciliationResult::new(
                rerun,
                txn,
                MatchStatus::Ambiguous,
            ))
            .unwrap();

        let results = fx.db.list_reconciliation_results(run).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_upload_id, Some(fx.receipt_id));
        assert_eq!(results[0].match_score.unwrap().value(), dec!(0.87));
    }

    #[test]
    fn test_reconciliation_result_invariants() {
        let fx = LedgerFixture::new();
        let run = fx
            .db
            .start_reconciliation_run(&NewReconciliationRun::new(RunStrategy::Fuzzy))
            .unwrap();
        let txn = fx.transaction_ids[0];

        // Matched upload must be a receipt
        let mut wrong_type = NewReconciliationResult::new(run, txn, MatchStatus::Matched);
        wrong_type.matched_upload_id = Some(fx.statement_id);
        assert!(matches!(
            fx.db.record_reconciliation_result(&wrong_type),
            Err(Error::Domain(_))
        ));

        let mut missing_upload = NewReconciliationResult::new(run, txn, MatchStatus::Matched);
        missing_upload.matched_upload_id = Some(999_999);
        assert!(matches!(
            fx.db.record_reconciliation_result(&missing_upload),
            Err(Error::ReferentialIntegrity(_))
        ));

        let mut unmatched_with_receipt =
            NewReconciliationResult::new(run, txn, MatchStatus::Unmatched);
        unmatched_with_receipt.matched_upload_id = Some(fx.receipt_id);
        assert!(matches!(
            fx.db.record_reconciliation_result(&unmatched_with_receipt),
            Err(Error::Domain(_))
        ));

        let no_run = NewReconciliationResult::new(999_999, txn, MatchStatus::Ignored);
        assert!(matches!(
            fx.db.record_reconciliation_result(&no_run),
            Err(Error::ReferentialIntegrity(_))
        ));

        fx.db
            .finish_reconciliation_run(run, RunStatus::Completed, None)
            .unwrap();
        let late = NewReconciliationResult::new(run, txn, MatchStatus::Ignored);
        assert!(matches!(
            fx.db.record_reconciliation_result(&late),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(fx.count("reconciliation_results"), 0);
    }

    #[test]
    fn test_delete_run_cascades_results_and_nulls_reports() {
        let fx = LedgerFixture::new();
        let run = fx
            .db
            .start_reconciliation_run(&NewReconciliationRun::new(RunStrategy::Fuzzy))
            .unwrap();
        fx.db
            .record_reconciliation_result(&NewReconciliationResult::new(
                run,
                fx.transaction_ids[0],
                MatchStatus::Unmatched,
            ))
            .unwrap();
        fx.db
            .finish_reconciliation_run(run, RunStatus::Completed, None)
            .unwrap();

        let mut report = NewReport::new(
            ReportType::Summary,
            date(2024, 3, 1),
            date(2024, 3, 31),
            serde_json::json!({ "unmatched": 1 }),
        );
        report.reconciliation_run_id = Some(run);
        fx.db.insert_report(&report).unwrap();

        fx.db.delete_reconciliation_run(run).unwrap();

        assert_eq!(fx.count("reconciliation_results"), 0);
        let kept = fx
            .db
            .get_report(ReportType::Summary, date(2024, 3, 1), date(2024, 3, 31))
            .unwrap()
            .unwrap();
        assert_eq!(kept.reconciliation_run_id, None);
        assert_eq!(kept.payload["unmatched"], 1);
    }

    // ========== Reports ==========

    #[test]
    fn test_report_snapshots() {
        let db = seeded_db();
        let march = NewReport::new(
            ReportType::Pnl,
            date(2024, 3, 1),
            date(2024, 3, 31),
            serde_json::json!({ "income": "1500.00", "expense": "575.50" }),
        );
        db.insert_report(&march).unwrap();
        assert!(matches!(
            db.insert_report(&march),
            Err(Error::UniquenessViolation { entity: "report", .. })
        ));

        let april = NewReport::new(
            ReportType::Pnl,
            date(2024, 4, 1),
            date(2024, 4, 30),
            serde_json::json!({ "income": "0.00" }),
        );
        let april_id = db.insert_report(&april).unwrap();

        // Same period, different type
        db.insert_report(&NewReport::new(
            ReportType::Summary,
            date(2024, 3, 1),
            date(2024, 3, 31),
            serde_json::json!({}),
        ))
        .unwrap();

        let pnl = db.list_reports(Some(ReportType::Pnl)).unwrap();
        assert_eq!(pnl.len(), 2);
        assert_eq!(pnl[0].id, april_id);
        assert_eq!(db.list_reports(None).unwrap().len(), 3);

        let latest = db.latest_report(ReportType::Pnl).unwrap().unwrap();
        assert_eq!(latest.id, april_id);
        assert!(db
            .get_report(ReportType::Summary, date(2024, 4, 1), date(2024, 4, 30))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_report_validation_and_append_only() {
        let db = seeded_db();
        let backwards = NewReport::new(
            ReportType::Summary,
            date(2024, 3, 31),
            date(2024, 3, 1),
            serde_json::json!({}),
        );
        assert!(matches!(db.insert_report(&backwards), Err(Error::Domain(_))));

        let id = db
            .insert_report(&NewReport::new(
                ReportType::Summary,
                date(2024, 3, 1),
                date(2024, 3, 31),
                serde_json::json!({ "total": 1 }),
            ))
            .unwrap();

        let conn = db.conn().unwrap();
        assert!(conn
            .execute(
                "UPDATE reports SET payload = '{}' WHERE id = ?",
                params![id]
            )
            .is_err());
    }
}
