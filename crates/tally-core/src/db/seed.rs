//! Reference data: Thai chart of accounts, common vendors, demo users
//!
//! Every row is an upsert keyed on its natural key. The `DO UPDATE` clause
//! only fires when a descriptive column actually differs, so re-running the
//! seed against an up-to-date store reports zero changed rows.

use rusqlite::{Connection, Params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::migrations::ApplyReport;
use crate::error::{Error, Result};
use crate::models::CategoryType;

/// Which optional seed sets to apply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedOptions {
    /// Seed the demo admin/accountant/viewer accounts
    pub demo_users: bool,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self { demo_users: true }
    }
}

/// Outcome of one seed set
#[derive(Debug, Clone, Serialize)]
pub struct SeedSetReport {
    pub set: &'static str,
    /// Rows inserted or updated
    pub changed: usize,
    /// Rows in the seed set
    pub total: usize,
}

/// (code, name_th, name_en, type, parent code)
type CategorySeed = (
    &'static str,
    &'static str,
    &'static str,
    CategoryType,
    Option<&'static str>,
);

/// Parents precede their children
pub const SEED_CATEGORIES: &[CategorySeed] = &[
    ("1000", "สินทรัพย์", "Assets", CategoryType::Asset, None),
    ("1100", "เงินสดและรายการเทียบเท่าเงินสด", "Cash and cash equivalents", CategoryType::Asset, Some("1000")),
    ("1200", "ลูกหนี้การค้า", "Accounts receivable", CategoryType::Asset, Some("1000")),
    ("2000", "หนี้สิน", "Liabilities", CategoryType::Liability, None),
    ("2100", "เจ้าหนี้การค้า", "Accounts payable", CategoryType::Liability, Some("2000")),
    ("2200", "ค่าใช้จ่ายค้างจ่าย", "Accrued expenses", CategoryType::Liability, Some("2000")),
    ("3000", "ส่วนของเจ้าของ", "Equity", CategoryType::Equity, None),
    ("3100", "ทุนจดทะเบียน", "Registered capital", CategoryType::Equity, Some("3000")),
    ("4000", "รายได้", "Income", CategoryType::Income, None),
    ("4100", "รายได้จากการขาย", "Sales revenue", CategoryType::Income, Some("4000")),
    ("4200", "รายได้จากการให้บริการ", "Service revenue", CategoryType::Income, Some("4000")),
    ("4900", "รายได้อื่น", "Other income", CategoryType::Income, Some("4000")),
    ("5000", "ต้นทุนขาย", "Cost of goods sold", CategoryType::Cogs, None),
    ("5100", "ซื้อสินค้า", "Purchases", CategoryType::Cogs, Some("5000")),
    ("6000", "ค่าใช้จ่าย", "Expenses", CategoryType::Expense, None),
    ("6100", "เงินเดือนและค่าจ้าง", "Salaries and wages", CategoryType::Expense, Some("6000")),
    ("6200", "ค่าเช่า", "Rent", CategoryType::Expense, Some("6000")),
    ("6300", "ค่าสาธารณูปโภค", "Utilities", CategoryType::Expense, Some("6000")),
    ("6400", "ค่าเดินทาง", "Travel", CategoryType::Expense, Some("6000")),
    ("6500", "ค่าโฆษณา", "Advertising", CategoryType::Expense, Some("6000")),
    ("6600", "ค่าธรรมเนียมธนาคาร", "Bank fees", CategoryType::Expense, Some("6000")),
    ("6700", "วัสดุสำนักงาน", "Office supplies", CategoryType::Expense, Some("6000")),
    ("6800", "ค่าธรรมเนียมวิชาชีพ", "Professional fees", CategoryType::Expense, Some("6000")),
    ("7000", "ภาษี", "Taxes", CategoryType::Tax, None),
    ("7100", "ภาษีซื้อ", "Input VAT", CategoryType::Tax, Some("7000")),
    ("7200", "ภาษีขาย", "Output VAT", CategoryType::Tax, Some("7000")),
    ("7300", "ภาษีหัก ณ ที่จ่าย", "Withholding tax", CategoryType::Tax, Some("7000")),
];

/// (vendor name, default category code)
pub const SEED_VENDORS: &[(&str, &str)] = &[
    ("7-Eleven", "6700"),
    ("Makro", "5100"),
    ("Lazada", "6700"),
    ("Shopee", "6700"),
    ("PTT", "6400"),
    ("Grab", "6400"),
    ("Thai Airways", "6400"),
    ("AIS", "6300"),
    ("True Corporation", "6300"),
    ("Metropolitan Electricity Authority", "6300"),
    ("Facebook Ads", "6500"),
    ("Kasikornbank", "6600"),
];

/// (email, full name, role)
pub const SEED_DEMO_USERS: &[(&str, &str, &str)] = &[
    ("admin@tally.local", "Demo Admin", "admin"),
    ("accountant@tally.local", "Demo Accountant", "accountant"),
    ("viewer@tally.local", "Demo Viewer", "user"),
];

const UPSERT_CATEGORY: &str = r#"
INSERT INTO thai_accounting_categories (code, name_th, name_en, category_type, parent_id)
VALUES (?1, ?2, ?3, ?4, (SELECT id FROM thai_accounting_categories WHERE code = ?5))
ON CONFLICT(code) DO UPDATE SET
    name_th = excluded.name_th,
    name_en = excluded.name_en,
    category_type = excluded.category_type,
    parent_id = excluded.parent_id,
    updated_at = CURRENT_TIMESTAMP
WHERE name_th IS NOT excluded.name_th
   OR name_en IS NOT excluded.name_en
   OR category_type IS NOT excluded.category_type
   OR parent_id IS NOT excluded.parent_id
"#;

const UPSERT_VENDOR: &str = r#"
INSERT INTO vendors (name, default_category_id)
VALUES (?1, (SELECT id FROM thai_accounting_categories WHERE code = ?2))
ON CONFLICT(name) DO UPDATE SET
    default_category_id = excluded.default_category_id,
    updated_at = CURRENT_TIMESTAMP
WHERE default_category_id IS NOT excluded.default_category_id
"#;

const UPSERT_USER: &str = r#"
INSERT INTO users (email, full_name, role)
VALUES (?1, ?2, ?3)
ON CONFLICT(email) DO UPDATE SET
    full_name = excluded.full_name,
    role = excluded.role,
    updated_at = CURRENT_TIMESTAMP
WHERE full_name IS NOT excluded.full_name
   OR role IS NOT excluded.role
"#;

/// Run one upsert per row, stopping at the first failure
fn run_set<P: Params>(
    conn: &Connection,
    set: &'static str,
    sql: &str,
    rows: Vec<(String, P)>,
) -> Result<SeedSetReport> {
    let step = format!("seed {}", set);
    let total = rows.len();
    let mut changed = 0;

    for (i, (key, values)) in rows.into_iter().enumerate() {
        let n = conn.execute(sql, values).map_err(|source| Error::Apply {
            step: step.clone(),
            index: i + 1,
            statement: format!("{} [{}]", sql.trim(), key),
            source,
        })?;
        if n > 0 {
            debug!(set, key = %key, "Seed row upserted");
        }
        changed += n;
    }

    info!(set, changed, total, "Seeded reference data");
    Ok(SeedSetReport {
        set,
        changed,
        total,
    })
}

/// Upsert every reference row, appending one entry per set to `report`
pub(crate) fn seed_reference_data(
    conn: &Connection,
    options: &SeedOptions,
    report: &mut ApplyReport,
) -> Result<()> {
    let categories = SEED_CATEGORIES
        .iter()
        .map(|(code, name_th, name_en, category_type, parent)| {
            (
                code.to_string(),
                (*code, *name_th, *name_en, category_type.as_str(), *parent),
            )
        })
        .collect();
    report
        .seed_sets
        .push(run_set(conn, "categories", UPSERT_CATEGORY, categories)?);

    let vendors = SEED_VENDORS
        .iter()
        .map(|(name, code)| (name.to_string(), (*name, *code)))
        .collect();
    report
        .seed_sets
        .push(run_set(conn, "vendors", UPSERT_VENDOR, vendors)?);

    if options.demo_users {
        let users = SEED_DEMO_USERS
            .iter()
            .map(|(email, full_name, role)| (email.to_string(), (*email, *full_name, *role)))
            .collect();
        report
            .seed_sets
            .push(run_set(conn, "users", UPSERT_USER, users)?);
    }

    Ok(())
}
