use async_trait::async_trait;
use gradeloops_db::{AgentRunRow, Database};
use gradeloops_logging::{LogEvent, Logger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifacts::write;
use crate::error::PersistenceError;
use crate::record::RunRecord;

/// Secondary, best-effort store for run records.
///
/// Failures are logged and swallowed by [`RunRecorder`].
#[async_trait]
pub trait RunMirror: Send + Sync {
    async fn append(&self, record: &RunRecord) -> anyhow::Result<()>;
}

#[async_trait]
impl RunMirror for Database {
    async fn append(&self, record: &RunRecord) -> anyhow::Result<()> {
        let row = AgentRunRow {
            cycle_id: record.cycle_id.clone(),
            agent_name: record.agent_name.clone(),
            attempt: record.attempt,
            status: record.status.as_str().to_string(),
            overall_score: record.overall_score,
            dimension_scores: record
                .dimension_scores
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            feedback: record.feedback.clone(),
            suggested_fixes: record
                .suggested_fixes
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            artifact_path: record.artifact_path.clone(),
            created_at: record.created_at.to_rfc3339(),
            duration_ms: record.duration_ms.map(|ms| ms as i64),
            rubric_version: record.rubric_version.clone(),
        };
        self.agent_runs().insert(&row)?;
        Ok(())
    }
}

/// Appends run records to the cycle's `run-log.json`, then mirrors them.
pub struct RunRecorder<'a> {
    log_path: PathBuf,
    mirror: Option<&'a dyn RunMirror>,
    logger: Arc<Logger>,
}

impl<'a> RunRecorder<'a> {
    pub fn new(log_path: PathBuf, mirror: Option<&'a dyn RunMirror>, logger: Arc<Logger>) -> Self {
        Self {
            log_path,
            mirror,
            logger,
        }
    }

    /// Durably append `record` to the run log.
    ///
    /// The log is rewritten in full; records already present (including
    /// those of other agents in the same cycle) are kept unchanged.
    pub async fn record(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        let mut records = read_run_log(&self.log_path).await?;
        records.push(record.clone());

        let json = serde_json::to_string_pretty(&records).map_err(|source| {
            PersistenceError::Serialize {
                what: "run log",
                source,
            }
        })?;
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        write(&self.log_path, json.as_bytes()).await?;

        debug!(
            attempt = record.attempt,
            status = %record.status,
            total = records.len(),
            "Recorded run"
        );

        if let Some(mirror) = self.mirror {
            if let Err(e) = mirror.append(record).await {
                warn!(error = %e, attempt = record.attempt, "Failed to mirror run record");
                self.logger.log(&LogEvent::MirrorWriteFailed {
                    attempt: record.attempt,
                    error: e.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Read every record in a run log. A missing file is an empty log.
pub async fn read_run_log(path: &Path) -> Result<Vec<RunRecord>, PersistenceError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content).map_err(|source| PersistenceError::CorruptLog {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RunStatus;
    use gradeloops_logging::LogFormat;
    use std::collections::BTreeMap;

    struct BrokenMirror;

    #[async_trait]
    impl RunMirror for BrokenMirror {
        async fn append(&self, _record: &RunRecord) -> anyhow::Result<()> {
            anyhow::bail!("agent_runs table unreachable")
        }
    }

    fn quiet_logger() -> Arc<Logger> {
        Arc::new(Logger::new(LogFormat::Compact).without_console())
    }

    #[tokio::test]
    async fn test_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle").join("run-log.json");
        let recorder = RunRecorder::new(path.clone(), None, quiet_logger());

        recorder
            .record(&RunRecord::new("cycle", "a", 1, RunStatus::Produced))
            .await
            .unwrap();
        recorder
            .record(&RunRecord::new("cycle", "a", 1, RunStatus::Evaluated))
            .await
            .unwrap();

        let records = read_run_log(&path).await.unwrap();
        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![RunStatus::Produced, RunStatus::Evaluated]);
    }

    #[tokio::test]
    async fn test_keeps_records_from_other_agents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-log.json");
        let first = RunRecorder::new(path.clone(), None, quiet_logger());
        first
            .record(&RunRecord::new("cycle", "scout", 1, RunStatus::Passed))
            .await
            .unwrap();

        let second = RunRecorder::new(path.clone(), None, quiet_logger());
        second
            .record(&RunRecord::new("cycle", "builder", 1, RunStatus::Produced))
            .await
            .unwrap();

        let records = read_run_log(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent_name, "scout");
    }

    #[tokio::test]
    async fn test_corrupt_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-log.json");
        std::fs::write(&path, "{not an array").unwrap();

        let recorder = RunRecorder::new(path, None, quiet_logger());
        let err = recorder
            .record(&RunRecord::new("c", "a", 1, RunStatus::Produced))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptLog { .. }));
    }

    #[tokio::test]
    async fn test_mirror_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-log.json");
        let log_file = dir.path().join("events.jsonl");
        let logger = Arc::new(
            Logger::with_file(LogFormat::Json, &log_file)
                .unwrap()
                .without_console(),
        );
        let mirror = BrokenMirror;
        let recorder = RunRecorder::new(path.clone(), Some(&mirror), logger);

        recorder
            .record(&RunRecord::new("c", "a", 1, RunStatus::Produced))
            .await
            .unwrap();

        assert_eq!(read_run_log(&path).await.unwrap().len(), 1);
        let events = std::fs::read_to_string(log_file).unwrap();
        assert!(events.contains("mirror_write_failed"));
        assert!(events.contains("agent_runs table unreachable"));
    }

    #[tokio::test]
    async fn test_database_mirror_stores_json_columns() {
        let db = Database::open_in_memory().unwrap();
        let mut record = RunRecord::new("c", "a", 2, RunStatus::Failed);
        record.overall_score = Some(0.4);
        record.dimension_scores = Some(BTreeMap::from([("clarity".to_string(), 0.4)]));
        record.suggested_fixes = Some(vec!["Add sources".to_string()]);
        record.duration_ms = Some(900);

        db.append(&record).await.unwrap();

        let rows = db.agent_runs().list_for_cycle("c").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "failed");
        assert_eq!(rows[0].dimension_scores.as_deref(), Some(r#"{"clarity":0.4}"#));
        assert_eq!(rows[0].suggested_fixes.as_deref(), Some(r#"["Add sources"]"#));
        assert_eq!(rows[0].duration_ms, Some(900));
    }
}
