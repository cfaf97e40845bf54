use std::path::{Path, PathBuf};

/// Directory holding prompts, rubrics and the agent registry.
pub const SYSTEM_DIR: &str = "SYSTEM";

/// Registry location relative to the project root.
pub const REGISTRY_PATH: &str = "SYSTEM/config/agents.yaml";

/// Default artifact root relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = "WORK/runs";

/// Resolves where configuration, prompts and artifacts live for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Walk up from `start` to the first directory containing `SYSTEM/`.
    /// Falls back to `start` when no ancestor has one.
    pub fn discover(start: &Path) -> Self {
        let root = start
            .ancestors()
            .find(|dir| dir.join(SYSTEM_DIR).is_dir())
            .unwrap_or(start)
            .to_path_buf();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn system_dir(&self) -> PathBuf {
        self.root.join(SYSTEM_DIR)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_PATH)
    }

    /// Resolve a prompt or rubric ref from the registry.
    pub fn resolve_system(&self, reference: &str) -> PathBuf {
        self.system_dir().join(reference)
    }

    /// Resolve an output directory; relative paths are anchored at the root.
    pub fn resolve_output(&self, output_dir: &Path) -> PathBuf {
        if output_dir.is_absolute() {
            output_dir.to_path_buf()
        } else {
            self.root.join(output_dir)
        }
    }
}
