use std::path::Path;
use tracing::debug;

use crate::parser::{self, Mapping};
use crate::ConfigError;

/// Version reported when a rubric has no `metadata.version`.
pub const DEFAULT_RUBRIC_VERSION: &str = "1.0.0";

/// One scoring dimension of a rubric.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub weight: f64,
    pub description: String,
    /// Level → guidance text, in document order
    pub scoring: Vec<(String, String)>,
}

/// The evaluation contract for an agent.
///
/// The dimension names are the exact key set every evaluator response must
/// carry in `dimensionScores`.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricSpec {
    pub name: Option<String>,
    pub version: String,
    pub agent: Option<String>,
    pub updated: Option<String>,
    pub threshold: Option<f64>,
    pub dimensions: Vec<Dimension>,
    /// Raw document text, quoted verbatim to the evaluator
    pub source: String,
}

impl RubricSpec {
    /// Load a rubric file. Any failure (I/O, syntax, shape) is reported as
    /// [`ConfigError::RubricUnreadable`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let unreadable = |reason: String| ConfigError::RubricUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let rubric = Self::parse(&content).map_err(|e| unreadable(e.to_string()))?;

        debug!(
            path = %path.display(),
            version = %rubric.version,
            dimensions = rubric.dimensions.len(),
            "Loaded rubric"
        );
        Ok(rubric)
    }

    /// Parse rubric text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let root = parser::parse(content)?;

        let metadata = root.mapping_at("metadata")?;
        let meta_text = |key: &str| -> Result<Option<String>, ConfigError> {
            match metadata {
                Some(m) => m.text_at(key),
                None => Ok(None),
            }
        };

        let threshold = root.f64_at("threshold")?;
        if let Some(t) = threshold {
            check_unit_interval("threshold", t)?;
        }

        let dims = root.require_mapping("dimensions")?;
        let dimensions = dims
            .iter()
            .map(|(name, _)| parse_dimension(dims, name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: meta_text("name")?,
            version: meta_text("version")?.unwrap_or_else(|| DEFAULT_RUBRIC_VERSION.to_string()),
            agent: meta_text("agent")?,
            updated: meta_text("updated")?,
            threshold,
            dimensions,
            source: content.to_string(),
        })
    }

    /// Dimension names in document order.
    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.iter().any(|d| d.name == name)
    }
}

fn parse_dimension(dims: &Mapping, name: &str) -> Result<Dimension, ConfigError> {
    let dim = dims.require_mapping(name)?;

    let weight = dim.f64_at("weight")?.ok_or_else(|| ConfigError::InvalidField {
        path: format!("{}.weight", dim.path()),
        message: "missing required field".to_string(),
    })?;
    if weight < 0.0 {
        return Err(ConfigError::InvalidField {
            path: format!("{}.weight", dim.path()),
            message: format!("weight must be non-negative, found {}", weight),
        });
    }

    let scoring = match dim.mapping_at("scoring")? {
        Some(levels) => levels
            .keys()
            .map(|level| {
                let text = levels.text_at(level)?.unwrap_or_default();
                Ok((level.to_string(), text))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
        None => Vec::new(),
    };

    Ok(Dimension {
        name: name.to_string(),
        weight,
        description: dim.str_at("description")?.unwrap_or_default().to_string(),
        scoring,
    })
}

pub(crate) fn check_unit_interval(path: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidField {
            path: path.to_string(),
            message: format!("expected a value in [0, 1], found {}", value),
        });
    }
    Ok(())
}
