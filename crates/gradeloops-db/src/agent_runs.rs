//! Agent runs store, the structured mirror of each cycle's run log.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

/// One row of the `agent_runs` table.
///
/// Structured fields (dimension scores, suggested fixes) are stored as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunRow {
    pub cycle_id: String,
    pub agent_name: String,
    pub attempt: u32,
    pub status: String,
    pub overall_score: Option<f64>,
    pub dimension_scores: Option<String>,
    pub feedback: Option<String>,
    pub suggested_fixes: Option<String>,
    pub artifact_path: Option<String>,
    pub created_at: String,
    pub duration_ms: Option<i64>,
    pub rubric_version: Option<String>,
}

/// Agent runs store with a borrowed connection.
pub struct AgentRuns<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> AgentRuns<'db> {
    /// Create a new AgentRuns store with a borrowed connection.
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Insert a row. Rows are never updated.
    pub fn insert(&self, row: &AgentRunRow) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            r#"
            INSERT INTO agent_runs (
                cycle_id, agent_name, attempt, status, overall_score,
                dimension_scores, feedback, suggested_fixes, artifact_path,
                created_at, duration_ms, rubric_version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                row.cycle_id,
                row.agent_name,
                row.attempt,
                row.status,
                row.overall_score,
                row.dimension_scores,
                row.feedback,
                row.suggested_fixes,
                row.artifact_path,
                row.created_at,
                row.duration_ms,
                row.rubric_version,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// All rows for a cycle, in insertion order.
    pub fn list_for_cycle(&self, cycle_id: &str) -> Result<Vec<AgentRunRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT cycle_id, agent_name, attempt, status, overall_score,
                   dimension_scores, feedback, suggested_fixes, artifact_path,
                   created_at, duration_ms, rubric_version
            FROM agent_runs
            WHERE cycle_id = ?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![cycle_id], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }

    /// Number of rows for a cycle.
    pub fn count_for_cycle(&self, cycle_id: &str) -> Result<usize, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM agent_runs WHERE cycle_id = ?1",
            params![cycle_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<AgentRunRow, rusqlite::Error> {
        Ok(AgentRunRow {
            cycle_id: row.get(0)?,
            agent_name: row.get(1)?,
            attempt: row.get(2)?,
            status: row.get(3)?,
            overall_score: row.get(4)?,
            dimension_scores: row.get(5)?,
            feedback: row.get(6)?,
            suggested_fixes: row.get(7)?,
            artifact_path: row.get(8)?,
            created_at: row.get(9)?,
            duration_ms: row.get(10)?,
            rubric_version: row.get(11)?,
        })
    }
}
