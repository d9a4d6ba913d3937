//! SQLite expense store with connection pooling and migrations

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

use super::ExpenseStore;
use crate::error::Result;
use crate::models::{sentinel_date, ExpenseEntry};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

const SELECT_COLUMNS: &str = "date, amount, category, payer, telegram_user, chat_id, message_id,
     processed_at, source, receipt_path, receipt_file_id, title, model, overall_confidence";

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(4).build(manager)?;
        Self::with_pool(pool, path)
    }

    /// Private in-memory database (for testing)
    ///
    /// Every pooled connection to `:memory:` would see its own empty
    /// database, so the pool holds a single connection.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::with_pool(pool, ":memory:")
    }

    fn with_pool(pool: DbPool, path: &str) -> Result<Self> {
        let store = Self {
            pool,
            db_path: path.to_string(),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Number of stored expenses
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                payer TEXT NOT NULL,
                telegram_user TEXT,
                chat_id INTEGER,
                message_id INTEGER,
                processed_at TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT 'photo',
                receipt_path TEXT,
                receipt_file_id TEXT,
                title TEXT NOT NULL DEFAULT '',
                model TEXT,
                overall_confidence REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);
            CREATE INDEX IF NOT EXISTS idx_expenses_payer ON expenses(payer);
            CREATE INDEX IF NOT EXISTS idx_expenses_chat ON expenses(chat_id);
            "#,
        )?;

        info!("Expense database ready at {}", self.db_path);
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<ExpenseEntry> {
        let date_str: String = row.get(0)?;
        let category_str: String = row.get(2)?;
        let source_str: String = row.get(8)?;

        Ok(ExpenseEntry {
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_else(|_| sentinel_date()),
            amount: row.get(1)?,
            category: category_str.parse().unwrap_or_default(),
            payer: row.get(3)?,
            telegram_user: row.get(4)?,
            chat_id: row.get(5)?,
            message_id: row.get(6)?,
            processed_at: row.get(7)?,
            source: source_str.parse().unwrap_or_default(),
            receipt_path: row.get(9)?,
            receipt_file_id: row.get(10)?,
            title: row.get(11)?,
            model: row.get(12)?,
            overall_confidence: row.get(13)?,
        })
    }
}

impl ExpenseStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn save_expense(&self, entry: &ExpenseEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO expenses (date, amount, category, payer, telegram_user, chat_id,
             message_id, processed_at, source, receipt_path, receipt_file_id, title, model,
             overall_confidence)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.date.format("%Y-%m-%d").to_string(),
                entry.amount,
                entry.category.as_str(),
                entry.payer,
                entry.telegram_user,
                entry.chat_id,
                entry.message_id,
                entry.processed_at,
                entry.source.as_str(),
                entry.receipt_path,
                entry.receipt_file_id,
                entry.title,
                entry.model,
                entry.overall_confidence,
            ],
        )?;
        Ok(())
    }

    fn list_expenses(&self, limit: usize) -> Result<Vec<ExpenseEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM expenses ORDER BY id DESC LIMIT ?",
            SELECT_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
