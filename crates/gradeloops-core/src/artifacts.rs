use gradeloops_evaluator::EvaluationResult;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;

/// An artifact body written to disk
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the body
    pub digest: String,
}

/// Per-agent artifact directory: `<output>/<cycle>/<agent>/`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn attempt_path(&self, attempt: u32) -> PathBuf {
        self.dir.join(format!("attempt-{}.md", attempt))
    }

    pub fn evaluation_path(&self, attempt: u32) -> PathBuf {
        self.dir.join(format!("attempt-{}.eval.json", attempt))
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join("final.md")
    }

    /// Create the directory if needed
    pub async fn prepare(&self) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::Write {
                path: self.dir.clone(),
                source,
            })
    }

    pub async fn save_attempt(
        &self,
        attempt: u32,
        content: &str,
    ) -> Result<SavedArtifact, PersistenceError> {
        let path = self.attempt_path(attempt);
        write(&path, content.as_bytes()).await?;

        Ok(SavedArtifact {
            path,
            bytes: content.len(),
            digest: hex::encode(Sha256::digest(content.as_bytes())),
        })
    }

    pub async fn save_evaluation(
        &self,
        attempt: u32,
        evaluation: &EvaluationResult,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.evaluation_path(attempt);
        let json = serde_json::to_string_pretty(evaluation).map_err(|source| {
            PersistenceError::Serialize {
                what: "evaluation",
                source,
            }
        })?;
        write(&path, json.as_bytes()).await?;
        Ok(path)
    }

    /// Copy the winning attempt to `final.md`
    pub async fn promote(&self, attempt_path: &Path) -> Result<PathBuf, PersistenceError> {
        let path = self.final_path();
        tokio::fs::copy(attempt_path, &path)
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

pub(crate) async fn write(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_attempt_files_and_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("cycle").join("agent"));
        store.prepare().await.unwrap();

        let saved = store.save_attempt(2, "# Targets\n").await.unwrap();
        assert_eq!(saved.path, store.dir().join("attempt-2.md"));
        assert_eq!(saved.bytes, 10);
        assert_eq!(saved.digest.len(), 64);

        let final_path = store.promote(&saved.path).await.unwrap();
        assert_eq!(std::fs::read_to_string(final_path).unwrap(), "# Targets\n");
    }

    #[tokio::test]
    async fn test_evaluation_is_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());

        let evaluation = EvaluationResult {
            overall_score: 0.9,
            passed: true,
            dimension_scores: BTreeMap::from([("clarity".to_string(), 0.9)]),
            feedback: "Good".to_string(),
            suggested_fixes: vec![],
        };
        let path = store.save_evaluation(1, &evaluation).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["overallScore"], 0.9);
        assert_eq!(json["dimensionScores"]["clarity"], 0.9);
    }

    #[tokio::test]
    async fn test_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("never-created"));

        let err = store.save_attempt(1, "x").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Write { .. }));
    }
}
