//! Reference data listings (chart of accounts, vendors)

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tally_core::db::Database;

pub fn cmd_categories(db: &Database, json: bool) -> Result<()> {
    let tree = db.category_tree()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree.walk())?);
        return Ok(());
    }

    if tree.is_empty() {
        println!("No categories found. Run 'tally apply' to seed the chart of accounts.");
        return Ok(());
    }

    println!();
    println!("📒 Chart of Accounts");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in tree.walk() {
        let prefix = "  ".repeat(entry.depth);
        let category = entry.category;
        let english = category
            .name_en
            .as_ref()
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();
        println!(
            "   {}• {} {}{} [{}]",
            prefix,
            category.code,
            category.name_th,
            english,
            category.category_type.as_str()
        );
    }

    println!();
    println!("   {} categories", tree.len());
    Ok(())
}

#[derive(Serialize)]
struct VendorRow<'a> {
    name: &'a str,
    category_code: Option<&'a str>,
    category_name: Option<&'a str>,
}

pub fn cmd_vendors(db: &Database, json: bool) -> Result<()> {
    let vendors = db.list_vendors()?;
    let categories: HashMap<i64, _> = db
        .list_categories()?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let rows: Vec<VendorRow> = vendors
        .iter()
        .map(|v| {
            let category = v.default_category_id.and_then(|id| categories.get(&id));
            VendorRow {
                name: &v.name,
                category_code: category.map(|c| c.code.as_str()),
                category_name: category.map(|c| c.display_name()),
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No vendors found. Run 'tally apply' to seed reference data.");
        return Ok(());
    }

    println!();
    println!("🏪 Vendors");
    println!("   ─────────────────────────────────────────────────────────────");

    for row in &rows {
        match (row.category_code, row.category_name) {
            (Some(code), Some(name)) => {
                println!("   {:<24} → {} {}", row.name, code, name);
            }
            _ => println!("   {:<24} (no default category)", row.name),
        }
    }

    println!();
    println!("   {} vendors", rows.len());
    Ok(())
}
