//! SQLite adapter: Implementation of AssessmentStore.
//!
//! Reports are stored one row per analysis, keyed by `(user_id, created_at)`.
//! Summary columns support listing without deserializing; the complete
//! report is kept as JSON. A save is a single INSERT, so it is atomic.
//!
//! # Mutex Behavior
//!
//! Database connection is protected by `Mutex`. A poisoned mutex (from panic
//! in another thread) will cause panic.
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::domain::AnalysisReport;
use crate::ports::{AssessmentStore, ReportPage};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate report for user at {0}")]
    Duplicate(String),
}

/// SQLite storage adapter.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS analysis_results (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                retinal_risk REAL NOT NULL,
                lifestyle_risk REAL NOT NULL,
                combined_risk REAL NOT NULL,
                risk_category TEXT NOT NULL,
                confidence REAL NOT NULL,
                degraded INTEGER NOT NULL,
                report_json TEXT NOT NULL,
                UNIQUE (user_id, created_at)
            );

            CREATE INDEX IF NOT EXISTS idx_results_user_created
                ON analysis_results(user_id, created_at DESC);
            ",
        )?;

        Ok(())
    }

    fn decode(json: &str) -> Result<AnalysisReport, StorageError> {
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn query_reports(
        conn: &Connection,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AnalysisReport>, StorageError> {
        let mut stmt = conn.prepare(
            r"
            SELECT report_json
            FROM analysis_results
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            ",
        )?;

        let rows = stmt
            .query_map(params![user_id, limit as i64, offset as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter().map(|json| Self::decode(json)).collect()
    }

    fn count_for(conn: &Connection, user_id: &str) -> Result<usize, StorageError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_results WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl AssessmentStore for SqliteStore {
    type Error = StorageError;

    fn save_report(&self, user_id: &str, report: &AnalysisReport) -> Result<(), Self::Error> {
        let json = serde_json::to_string(report)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        // Fixed-width timestamps keep lexical order equal to time order.
        let created_at = report
            .created_at
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let a = &report.assessment;

        let conn = self.conn.lock().expect("Lock failed");
        let result = conn.execute(
            r"
            INSERT INTO analysis_results (
                id, user_id, created_at, retinal_risk, lifestyle_risk,
                combined_risk, risk_category, confidence, degraded, report_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                report.id,
                user_id,
                created_at,
                a.retinal_risk,
                a.lifestyle_risk,
                a.combined_risk,
                a.risk_category.as_str(),
                a.confidence,
                i64::from(report.status.is_degraded()),
                json,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!("Saved report {} to storage", report.id);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::Duplicate(created_at))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_report(&self, id: &str) -> Result<Option<AnalysisReport>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let json: Option<String> = conn
            .query_row(
                "SELECT report_json FROM analysis_results WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        json.as_deref().map(Self::decode).transpose()
    }

    fn load_recent(&self, user_id: &str, limit: usize) -> Result<Vec<AnalysisReport>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        Self::query_reports(&conn, user_id, limit, 0)
    }

    fn load_page(&self, user_id: &str, offset: usize, limit: usize) -> Result<ReportPage, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let total_count = Self::count_for(&conn, user_id)?;
        let items = Self::query_reports(&conn, user_id, limit, offset)?;
        Ok(ReportPage::new(items, total_count, offset, limit))
    }

    fn count(&self, user_id: &str) -> Result<usize, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        Self::count_for(&conn, user_id)
    }

    fn delete_report(&self, user_id: &str, id: &str) -> Result<bool, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let n = conn.execute(
            "DELETE FROM analysis_results WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        Ok(n > 0)
    }

    fn clear_user(&self, user_id: &str) -> Result<usize, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let n = conn.execute(
            "DELETE FROM analysis_results WHERE user_id = ?1",
            params![user_id],
        )?;
        tracing::warn!("Cleared {} stored reports", n);
        Ok(n)
    }
}
