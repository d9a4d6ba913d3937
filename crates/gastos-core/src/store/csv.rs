//! CSV expense file

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::ExpenseStore;
use crate::error::Result;
use crate::models::ExpenseEntry;

/// Column layout of the expense file
pub const CSV_HEADER: [&str; 14] = [
    "date",
    "amount",
    "category",
    "payer",
    "telegram_user",
    "chat_id",
    "message_id",
    "processed_at",
    "source",
    "receipt_path",
    "receipt_file_id",
    "title",
    "model",
    "overall_confidence",
];

/// Append-only CSV store
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with its header row if it does not exist yet
    pub fn ensure_file(&self) -> Result<()> {
        if self.has_content()? {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        debug!(path = %self.path.display(), "Created expense file");
        Ok(())
    }

    fn has_content(&self) -> Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl ExpenseStore for CsvStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn save_expense(&self, entry: &ExpenseEntry) -> Result<()> {
        self.ensure_file()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;
        Ok(())
    }

    fn list_expenses(&self, limit: usize) -> Result<Vec<ExpenseEntry>> {
        if !self.has_content()? {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut entries = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ExpenseEntry>, _>>()?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::entry;
    use super::*;
    use crate::models::{Category, ExpenseSource};

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("data").join("expenses.csv"));

        store.save_expense(&entry(29.86, "Exe")).unwrap();
        store.save_expense(&entry(3.5, "Ceci")).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert!(lines[1].starts_with("2026-01-07,29.86,Comida,Exe,exe,-100123,42,"));
        assert!(lines[1].contains(",photo,"));
    }

    #[test]
    fn test_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("expenses.csv"));
        for (i, payer) in ["a", "b", "c"].iter().enumerate() {
            store.save_expense(&entry(i as f64 + 1.0, payer)).unwrap();
        }

        let listed = store.list_expenses(2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].payer, "c");
        assert_eq!(listed[1].payer, "b");
    }

    #[test]
    fn test_manual_row_with_empty_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("expenses.csv"));
        let mut manual = entry(10.0, "Ceci");
        manual.source = ExpenseSource::Manual;
        manual.category = Category::Otros;
        manual.telegram_user = None;
        manual.chat_id = None;
        manual.message_id = None;
        manual.receipt_path = None;
        manual.model = None;
        manual.overall_confidence = None;
        store.save_expense(&manual).unwrap();

        let listed = store.list_expenses(10).unwrap();
        assert_eq!(listed, vec![manual]);
    }

    #[test]
    fn test_missing_file_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("none.csv"));
        assert!(store.list_expenses(5).unwrap().is_empty());
    }
}
