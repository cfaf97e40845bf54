//! Database layer for gradeloops.
//!
//! Provides a unified `Database` struct that owns the SQLite connection
//! and provides access to domain-specific stores.

mod agent_runs;

pub use agent_runs::{AgentRunRow, AgentRuns};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// The main database struct that owns the SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the default location.
    ///
    /// The default location is `~/.local/share/gradeloops/gradeloops.db`.
    pub fn open() -> Result<Self, rusqlite::Error> {
        Self::open_at(&Self::default_path())
    }

    /// Open or create a database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, rusqlite::Error> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the default database path.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gradeloops")
            .join("gradeloops.db")
    }

    /// Access the agent runs store.
    pub fn agent_runs(&self) -> AgentRuns<'_> {
        // A panic while holding the lock cannot leave a half-written row,
        // so a poisoned lock is still usable.
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        AgentRuns::new(conn)
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agent_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_id TEXT NOT NULL,
                agent_name TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                status TEXT NOT NULL,
                overall_score REAL,
                dimension_scores TEXT,
                feedback TEXT,
                suggested_fixes TEXT,
                artifact_path TEXT,
                created_at TEXT NOT NULL,
                duration_ms INTEGER,
                rubric_version TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_agent_runs_cycle ON agent_runs(cycle_id);
            CREATE INDEX IF NOT EXISTS idx_agent_runs_agent ON agent_runs(agent_name);
            "#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(cycle_id: &str, attempt: u32, status: &str) -> AgentRunRow {
        AgentRunRow {
            cycle_id: cycle_id.to_string(),
            agent_name: "target_builder".to_string(),
            attempt,
            status: status.to_string(),
            overall_score: None,
            dimension_scores: None,
            feedback: None,
            suggested_fixes: None,
            artifact_path: None,
            created_at: Utc::now().to_rfc3339(),
            duration_ms: None,
            rubric_version: None,
        }
    }

    #[test]
    fn test_insert_and_list() {
        let db = Database::open_in_memory().unwrap();

        let mut evaluated = row("2026-01-31-001", 1, "evaluated");
        evaluated.overall_score = Some(0.6);
        evaluated.dimension_scores = Some(r#"{"clarity":0.6}"#.to_string());
        evaluated.duration_ms = Some(1200);
        evaluated.rubric_version = Some("1.0.0".to_string());

        db.agent_runs().insert(&row("2026-01-31-001", 1, "produced")).unwrap();
        db.agent_runs().insert(&evaluated).unwrap();
        db.agent_runs().insert(&row("2026-01-31-002", 1, "produced")).unwrap();

        let rows = db.agent_runs().list_for_cycle("2026-01-31-001").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "produced");
        assert_eq!(rows[1], evaluated);
    }

    #[test]
    fn test_rows_are_never_replaced() {
        let db = Database::open_in_memory().unwrap();
        let record = row("c", 1, "failed");

        let first = db.agent_runs().insert(&record).unwrap();
        let second = db.agent_runs().insert(&record).unwrap();

        assert_ne!(first, second);
        assert_eq!(db.agent_runs().count_for_cycle("c").unwrap(), 2);
    }

    #[test]
    fn test_open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.db");

        let db = Database::open_at(&path).unwrap();
        db.agent_runs().insert(&row("c", 1, "produced")).unwrap();
        assert!(path.exists());
    }
}
