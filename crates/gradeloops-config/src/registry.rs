use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::parser::{self, ConfigValue, Mapping};
use crate::rubric::{check_unit_interval, RubricSpec};
use crate::ConfigError;

/// Threshold used when neither the agent, the registry defaults nor the
/// rubric set one.
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.85;

/// Attempt budget used when neither the agent nor the defaults set one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Immutable per-agent configuration resolved from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub description: Option<String>,
    /// Prompt file refs, relative to the `SYSTEM` directory
    pub producer_prompt: String,
    pub evaluator_prompt: String,
    pub reviser_prompt: String,
    /// Rubric file ref, relative to the `SYSTEM` directory
    pub rubric: String,
    /// Explicit threshold from the agent entry or registry defaults
    pub pass_threshold: Option<f64>,
    pub max_attempts: u32,
    pub escalate_on_fail: bool,
    /// Default producer inputs, in document order
    pub inputs: Vec<(String, Value)>,
}

impl AgentSpec {
    /// Effective pass threshold.
    /// Priority: agent/defaults > rubric threshold > [`DEFAULT_PASS_THRESHOLD`]
    pub fn effective_threshold(&self, rubric: &RubricSpec) -> f64 {
        self.pass_threshold
            .or(rubric.threshold)
            .unwrap_or(DEFAULT_PASS_THRESHOLD)
    }
}

/// Registry-wide defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistryDefaults {
    pub pass_threshold: Option<f64>,
    pub max_attempts: Option<u32>,
    pub escalate_on_fail: Option<bool>,
}

/// The declarative agent registry (`SYSTEM/config/agents.yaml`).
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    pub version: Option<String>,
    pub defaults: RegistryDefaults,
    agents: Mapping,
}

impl AgentRegistry {
    /// Load and parse the registry file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::RegistryUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let registry = Self::parse(&content)?;
        debug!(
            path = %path.display(),
            agents = registry.agents.len(),
            "Loaded agent registry"
        );
        Ok(registry)
    }

    /// Parse registry text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let root = parser::parse(content)?;

        let defaults = match root.mapping_at("defaults")? {
            Some(d) => {
                let pass_threshold = d.f64_at("pass_threshold")?;
                if let Some(t) = pass_threshold {
                    check_unit_interval("defaults.pass_threshold", t)?;
                }
                RegistryDefaults {
                    pass_threshold,
                    max_attempts: d.u32_at("max_attempts")?,
                    escalate_on_fail: d.bool_at("escalate_on_fail")?,
                }
            }
            None => RegistryDefaults::default(),
        };

        let version = root.text_at("version")?;
        let agents = root.require_mapping("agents")?.clone();

        Ok(Self {
            version,
            defaults,
            agents,
        })
    }

    /// Names of all registered agents, in document order.
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().map(String::from).collect()
    }

    /// Resolve an agent by name.
    pub fn agent(&self, name: &str) -> Result<AgentSpec, ConfigError> {
        let entry = match self.agents.get(name) {
            Some(ConfigValue::Mapping(m)) => m,
            Some(_) => {
                return Err(ConfigError::InvalidField {
                    path: format!("agents.{}", name),
                    message: "expected mapping".to_string(),
                })
            }
            None => {
                return Err(ConfigError::AgentNotFound {
                    name: name.to_string(),
                    available: self.agent_names(),
                })
            }
        };

        let pass_threshold = entry.f64_at("threshold")?.or(self.defaults.pass_threshold);
        if let Some(t) = pass_threshold {
            check_unit_interval(&format!("{}.threshold", entry.path()), t)?;
        }

        let max_attempts = entry
            .u32_at("max_attempts")?
            .or(self.defaults.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ConfigError::InvalidField {
                path: format!("{}.max_attempts", entry.path()),
                message: "must be at least 1".to_string(),
            });
        }

        let escalate_on_fail = entry
            .bool_at("escalate_on_fail")?
            .or(self.defaults.escalate_on_fail)
            .unwrap_or(true);

        let inputs = match entry.mapping_at("inputs")? {
            Some(inputs) => inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
            None => Vec::new(),
        };

        Ok(AgentSpec {
            name: name.to_string(),
            description: entry.str_at("description")?.map(String::from),
            producer_prompt: entry.require_str("producer")?.to_string(),
            evaluator_prompt: entry.require_str("evaluator")?.to_string(),
            reviser_prompt: entry.require_str("reviser")?.to_string(),
            rubric: entry.require_str("rubric")?.to_string(),
            pass_threshold,
            max_attempts,
            escalate_on_fail,
            inputs,
        })
    }
}
