use gradeloops_config::{ProjectLayout, SYSTEM_DIR};
use gradeloops_evaluator::LoopPrompts;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::PhaseError;

/// Ordered producer inputs, `key -> value`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerInputs {
    entries: Vec<(String, Value)>,
}

impl ProducerInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        let mut inputs = Self::new();
        for (key, value) in entries {
            inputs.set(key, value);
        }
        inputs
    }

    /// Replace an existing key in place, or append a new one
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the inputs block shown to every phase.
    ///
    /// Each input becomes `## <key>[ (source: <path>)]` followed by a `text`
    /// fence. String values naming an existing file are replaced by the
    /// file's contents.
    pub async fn render(&self, layout: &ProjectLayout) -> Result<String, PhaseError> {
        let mut sections = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let resolved = resolve_value(value, layout.root()).await?;
            let source_label = resolved
                .source
                .map(|p| format!(" (source: {})", p.display()))
                .unwrap_or_default();
            sections.push(format!(
                "## {}{}\n{}",
                key,
                source_label,
                LoopPrompts::wrap_block(&resolved.text, "text")
            ));
        }
        Ok(sections.join("\n\n"))
    }
}

struct ResolvedInput {
    text: String,
    source: Option<PathBuf>,
}

async fn resolve_value(value: &Value, root: &Path) -> Result<ResolvedInput, PhaseError> {
    let text = match value {
        Value::String(s) => {
            for candidate in file_candidates(s, root) {
                let is_file = tokio::fs::metadata(&candidate)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if is_file {
                    let text = tokio::fs::read_to_string(&candidate).await.map_err(|source| {
                        PhaseError::InputUnreadable {
                            path: candidate.clone(),
                            source,
                        }
                    })?;
                    return Ok(ResolvedInput {
                        text,
                        source: Some(candidate),
                    });
                }
            }
            s.clone()
        }
        Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    };
    Ok(ResolvedInput { text, source: None })
}

/// Absolute path, then `<root>/<value>`, then `<root>/SYSTEM/<value>`
fn file_candidates(value: &str, root: &Path) -> Vec<PathBuf> {
    if value.is_empty() {
        return Vec::new();
    }
    let path = Path::new(value);
    let mut candidates = Vec::with_capacity(3);
    if path.is_absolute() {
        candidates.push(path.to_path_buf());
    }
    candidates.push(root.join(value));
    candidates.push(root.join(SYSTEM_DIR).join(value));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replaces_in_place() {
        let mut inputs = ProducerInputs::from_entries(vec![
            ("thesis".to_string(), json!("fintech")),
            ("count".to_string(), json!(10)),
        ]);
        inputs.set("thesis", json!("healthtech"));
        inputs.set("region", json!("LATAM"));

        let keys: Vec<_> = inputs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["thesis", "count", "region"]);
        assert_eq!(inputs.get("thesis"), Some(&json!("healthtech")));
    }

    #[tokio::test]
    async fn test_render_literals() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path().to_path_buf());
        let inputs = ProducerInputs::from_entries(vec![
            ("thesis".to_string(), json!("LATAM Fintech")),
            ("note".to_string(), Value::Null),
            ("limits".to_string(), json!({"max": 5})),
            ("strict".to_string(), json!(true)),
        ]);

        let block = inputs.render(&layout).await.unwrap();
        assert_eq!(
            block,
            "## thesis\n```text\nLATAM Fintech\n```\n\n\
             ## note\n```text\n\n```\n\n\
             ## limits\n```text\n{\n  \"max\": 5\n}\n```\n\n\
             ## strict\n```text\ntrue\n```"
        );
    }

    #[tokio::test]
    async fn test_render_substitutes_system_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("SYSTEM").join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("triggers.yaml"), "funding: series_a").unwrap();

        let layout = ProjectLayout::new(dir.path().to_path_buf());
        let inputs = ProducerInputs::from_entries(vec![(
            "trigger_library".to_string(),
            json!("config/triggers.yaml"),
        )]);

        let block = inputs.render(&layout).await.unwrap();
        let expected_source = dir.path().join("SYSTEM").join("config/triggers.yaml");
        assert!(block.starts_with(&format!(
            "## trigger_library (source: {})\n",
            expected_source.display()
        )));
        assert!(block.contains("```text\nfunding: series_a\n```"));
    }

    #[tokio::test]
    async fn test_root_relative_wins_over_system() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("SYSTEM")).unwrap();
        std::fs::write(dir.path().join("notes.md"), "root").unwrap();
        std::fs::write(dir.path().join("SYSTEM").join("notes.md"), "system").unwrap();

        let layout = ProjectLayout::new(dir.path().to_path_buf());
        let inputs = ProducerInputs::from_entries(vec![("notes".to_string(), json!("notes.md"))]);

        let block = inputs.render(&layout).await.unwrap();
        assert!(block.contains("```text\nroot\n```"));
    }

    #[tokio::test]
    async fn test_directory_is_not_substituted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("SYSTEM")).unwrap();

        let layout = ProjectLayout::new(dir.path().to_path_buf());
        let inputs = ProducerInputs::from_entries(vec![("dir".to_string(), json!("SYSTEM"))]);

        let block = inputs.render(&layout).await.unwrap();
        assert_eq!(block, "## dir\n```text\nSYSTEM\n```");
    }
}
