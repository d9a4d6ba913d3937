//! Expense commands (manual entry, listing)

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use gastos_core::{Category, ExpenseEntry, ExpenseStore, ManualExpense};

use super::{truncate, StorageSettings};

/// Arguments of `gastos add`
#[derive(Debug, Clone)]
pub struct ManualArgs {
    pub amount: f64,
    pub date: Option<String>,
    pub title: Option<String>,
    pub category: String,
    pub payer: String,
}

pub fn cmd_add(storage: &StorageSettings, args: ManualArgs) -> Result<ExpenseEntry> {
    let now = Local::now();
    let today = now.date_naive();
    let category: Category = args.category.parse().map_err(|e: String| anyhow!(e))?;
    let payer = storage.resolve_payer(&args.payer)?;

    let entry = ManualExpense {
        amount: args.amount,
        date: args.date.unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
        title: args.title,
        category,
        payer,
    }
    .into_entry(today, now)?;

    let store = storage.open_store()?;
    store.save_expense(&entry).context("Failed to save expense")?;

    println!(
        "✅ Added {:.2} € on {} ({}, {}) paid by {}",
        entry.amount, entry.date, entry.title, entry.category, entry.payer
    );
    Ok(entry)
}

pub fn cmd_expenses(storage: &StorageSettings, limit: usize) -> Result<Vec<ExpenseEntry>> {
    let store = storage.open_store()?;
    let entries = store.list_expenses(limit).context("Failed to read expenses")?;

    if entries.is_empty() {
        println!("No expenses stored yet.");
        println!();
        println!("Add one with: gastos analyze ticket.jpg --save --payer NAME");
        return Ok(entries);
    }

    println!(
        "{:<10}  {:>10}  {:<15}  {:<8}  {:<7}  {}",
        "Date", "Amount", "Category", "Payer", "Source", "Title"
    );
    println!("{}", "─".repeat(80));
    for entry in &entries {
        println!(
            "{:<10}  {:>8.2} €  {:<15}  {:<8}  {:<7}  {}",
            entry.date,
            entry.amount,
            entry.category.as_str(),
            truncate(&entry.payer, 8),
            entry.source.as_str(),
            truncate(&entry.title, 30)
        );
    }

    let total: f64 = entries.iter().map(|e| e.amount).sum();
    println!("{}", "─".repeat(80));
    println!("{} expenses, {:.2} € total", entries.len(), total);
    Ok(entries)
}
