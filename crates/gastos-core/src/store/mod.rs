//! Expense persistence
//!
//! - `csv` - append-only CSV file with the historical column layout
//! - `sqlite` - SQLite database behind an r2d2 pool
//!
//! `CompositeStore` writes to the database (when configured) and then to
//! CSV, and reads from whichever is authoritative.

mod csv;
mod sqlite;

pub use self::csv::{CsvStore, CSV_HEADER};
pub use self::sqlite::{DbConn, DbPool, SqliteStore};

use tracing::info;

use crate::error::Result;
use crate::models::ExpenseEntry;

/// Anything that can persist and list expense entries
pub trait ExpenseStore {
    /// Store name for logs
    fn name(&self) -> &'static str;

    /// Persist one entry
    fn save_expense(&self, entry: &ExpenseEntry) -> Result<()>;

    /// Most recent entries first, at most `limit`
    fn list_expenses(&self, limit: usize) -> Result<Vec<ExpenseEntry>>;
}

/// Database first, then CSV
pub struct CompositeStore {
    database: Option<SqliteStore>,
    csv: CsvStore,
}

impl CompositeStore {
    pub fn new(database: Option<SqliteStore>, csv: CsvStore) -> Self {
        Self { database, csv }
    }

    pub fn csv(&self) -> &CsvStore {
        &self.csv
    }

    pub fn database(&self) -> Option<&SqliteStore> {
        self.database.as_ref()
    }
}

impl ExpenseStore for CompositeStore {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn save_expense(&self, entry: &ExpenseEntry) -> Result<()> {
        if let Some(db) = &self.database {
            db.save_expense(entry)?;
        }
        self.csv.save_expense(entry)?;
        info!(
            amount = entry.amount,
            category = %entry.category,
            payer = %entry.payer,
            source = entry.source.as_str(),
            "Expense saved"
        );
        Ok(())
    }

    fn list_expenses(&self, limit: usize) -> Result<Vec<ExpenseEntry>> {
        match &self.database {
            Some(db) => db.list_expenses(limit),
            None => self.csv.list_expenses(limit),
        }
    }
}
