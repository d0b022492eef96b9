//! SQLite persistence for completed analyses.
//!
//! One table holds the full per-request record: the input, the options
//! it ran with and the final report JSON. The connection sits behind a
//! mutex; callers on the async side go through `spawn_blocking`.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{Connection, params};
use tracing::info;

use crate::error::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analysis_results (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT NOT NULL,
    model_name  TEXT NOT NULL,
    text        TEXT NOT NULL,
    contextualize TEXT NOT NULL,
    result      TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_analysis_results_user
    ON analysis_results (user_id);
";

/// One persisted analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRecord {
    pub user_id: String,
    pub model_name: String,
    pub text: String,
    /// Wire form of the contextualize option, stored verbatim.
    pub contextualize: String,
    /// Final report as JSON.
    pub result: String,
}

/// Handle to the analysis database.
#[derive(Debug)]
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (and if needed creates) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "analysis database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a throwaway in-memory database.
    pub fn in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts one completed analysis.
    pub fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO analysis_results (user_id, model_name, text, contextualize, result)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.user_id,
                record.model_name,
                record.text,
                record.contextualize,
                record.result,
            ],
        )?;
        Ok(())
    }

    /// Returns all analyses stored for a user, oldest first.
    pub fn find_by_user(&self, user_id: &str) -> Result<Vec<AnalysisRecord>, Error> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT user_id, model_name, text, contextualize, result
             FROM analysis_results WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(AnalysisRecord {
                user_id: row.get(0)?,
                model_name: row.get(1)?,
                text: row.get(2)?,
                contextualize: row.get(3)?,
                result: row.get(4)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
