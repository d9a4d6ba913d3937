//! Storage settings and shared helpers
//!
//! Where expenses and receipt photos live comes from the environment:
//! `DATA_DIR`, `CSV_FILE`, `RECEIPTS_DIR`, `DATABASE_PATH` and `PAYERS`.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use gastos_core::{CompositeStore, CsvStore, SqliteStore};

const DEFAULT_PAYERS: &str = "Exe,Ceci";

/// Resolved storage locations
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub csv_file: PathBuf,
    pub receipts_dir: PathBuf,
    pub database_path: Option<PathBuf>,
    pub payers: Vec<String>,
}

impl StorageSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings with a custom variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let csv_file = get("CSV_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("expenses.csv"));
        let receipts_dir = get("RECEIPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("receipts"));
        let database_path = get("DATABASE_PATH").map(PathBuf::from);
        let payers = get("PAYERS")
            .unwrap_or_else(|| DEFAULT_PAYERS.to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            data_dir,
            csv_file,
            receipts_dir,
            database_path,
            payers,
        }
    }

    /// Open the configured stores (database when `DATABASE_PATH` is set, plus CSV)
    pub fn open_store(&self) -> Result<CompositeStore> {
        let database = match &self.database_path {
            Some(path) => {
                let path_str = path
                    .to_str()
                    .with_context(|| format!("Database path is not UTF-8: {}", path.display()))?;
                Some(SqliteStore::open(path_str).context("Failed to open expense database")?)
            }
            None => None,
        };
        Ok(CompositeStore::new(database, CsvStore::new(&self.csv_file)))
    }

    /// Match a payer name against the configured list, case-insensitively
    pub fn resolve_payer(&self, name: &str) -> Result<String> {
        let wanted = name.trim();
        match self.payers.iter().find(|p| p.eq_ignore_ascii_case(wanted)) {
            Some(payer) => Ok(payer.clone()),
            None => bail!(
                "Unknown payer '{}'. Configured payers: {}",
                wanted,
                self.payers.join(", ")
            ),
        }
    }

    /// Copy a receipt photo into the receipts directory
    pub fn archive_receipt(
        &self,
        bytes: &[u8],
        extension: &str,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.receipts_dir).with_context(|| {
            format!(
                "Failed to create receipts directory {}",
                self.receipts_dir.display()
            )
        })?;
        let path = self.receipts_dir.join(format!(
            "receipt_{}.{}",
            now.format("%Y%m%d_%H%M%S"),
            extension
        ));
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to archive receipt to {}", path.display()))?;
        Ok(path)
    }
}
