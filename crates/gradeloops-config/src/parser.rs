//! Parser for the nested `key: value` documents used by the agent registry
//! and rubric files.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! document := entry*
//! entry    := INDENT key ':' ( scalar | NEWLINE block )
//! block    := entry+        (one indentation level deeper than the parent)
//! scalar   := quoted | true | false | number | bare
//! ```
//!
//! Anything outside of it (tabs, list items, stray dedents, duplicate keys)
//! is rejected with the offending line number.

use serde_json::Value;

use crate::ConfigError;

/// A typed leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    /// Numbers keep their source text so identifiers such as `version: 1.0`
    /// can be read back verbatim.
    Number { value: f64, text: String },
    Bool(bool),
}

impl Scalar {
    /// Source text of the scalar (quotes stripped for strings).
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Str(s) => s.clone(),
            Scalar::Number { text, .. } => text.clone(),
            Scalar::Bool(b) => b.to_string(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Scalar::Str(_) => "string",
            Scalar::Number { .. } => "number",
            Scalar::Bool(_) => "boolean",
        }
    }
}

/// A node of the parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Scalar(Scalar),
    Mapping(Mapping),
}

impl ConfigValue {
    fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Scalar(s) => s.type_name(),
            ConfigValue::Mapping(_) => "mapping",
        }
    }

    /// Convert into a JSON value, preserving key order where the JSON map allows.
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Scalar(Scalar::Str(s)) => Value::String(s.clone()),
            ConfigValue::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            ConfigValue::Scalar(Scalar::Number { value, .. }) => {
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Value::from(*value as i64)
                } else {
                    serde_json::Number::from_f64(*value)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            ConfigValue::Mapping(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// An ordered mapping. Every mapping knows its dotted path inside the
/// document so accessor errors can point at the exact field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    path: String,
    entries: Vec<(String, ConfigValue)>,
}

impl Mapping {
    fn new(path: String) -> Self {
        Self {
            path,
            entries: Vec::new(),
        }
    }

    /// Dotted path of this mapping (empty for the document root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn mismatch(&self, key: &str, expected: &str, found: &ConfigValue) -> ConfigError {
        ConfigError::InvalidField {
            path: self.child_path(key),
            message: format!("expected {}, found {}", expected, found.type_name()),
        }
    }

    fn scalar(&self, key: &str, expected: &str) -> Result<Option<&Scalar>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Scalar(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(key, expected, other)),
        }
    }

    /// Optional string field.
    pub fn str_at(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        match self.scalar(key, "string")? {
            None => Ok(None),
            Some(Scalar::Str(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(key, "string", &ConfigValue::Scalar(other.clone()))),
        }
    }

    /// Any scalar rendered as its source text. Only meant for identifier-like
    /// fields (versions, dates) where `1.0` and `"1.0"` mean the same thing.
    pub fn text_at(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.scalar(key, "scalar")?.map(Scalar::as_text))
    }

    /// Optional finite number field.
    pub fn f64_at(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.scalar(key, "number")? {
            None => Ok(None),
            Some(Scalar::Number { value, .. }) => Ok(Some(*value)),
            Some(other) => Err(self.mismatch(key, "number", &ConfigValue::Scalar(other.clone()))),
        }
    }

    /// Optional non-negative integer field.
    pub fn u32_at(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        let Some(value) = self.f64_at(key)? else {
            return Ok(None);
        };
        if value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
            return Err(ConfigError::InvalidField {
                path: self.child_path(key),
                message: format!("expected non-negative integer, found {}", value),
            });
        }
        Ok(Some(value as u32))
    }

    /// Optional boolean field.
    pub fn bool_at(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.scalar(key, "boolean")? {
            None => Ok(None),
            Some(Scalar::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(key, "boolean", &ConfigValue::Scalar(other.clone()))),
        }
    }

    /// Optional nested mapping.
    pub fn mapping_at(&self, key: &str) -> Result<Option<&Mapping>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Mapping(m)) => Ok(Some(m)),
            Some(other) => Err(self.mismatch(key, "mapping", other)),
        }
    }

    /// Required string field.
    pub fn require_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.str_at(key)?.ok_or_else(|| self.missing(key))
    }

    /// Required nested mapping.
    pub fn require_mapping(&self, key: &str) -> Result<&Mapping, ConfigError> {
        self.mapping_at(key)?.ok_or_else(|| self.missing(key))
    }

    fn missing(&self, key: &str) -> ConfigError {
        ConfigError::InvalidField {
            path: self.child_path(key),
            message: "missing required field".to_string(),
        }
    }

    fn insert(&mut self, key: &str, value: ConfigValue, line: usize) -> Result<(), ConfigError> {
        if self.get(key).is_some() {
            return Err(ConfigError::Parse {
                line,
                message: format!("duplicate key `{}`", self.child_path(key)),
            });
        }
        self.entries.push((key.to_string(), value));
        Ok(())
    }
}

/// Parse a document into its root mapping.
pub fn parse(text: &str) -> Result<Mapping, ConfigError> {
    let lines = tokenize(text)?;
    let mut parser = Parser {
        lines: &lines,
        pos: 0,
    };
    let root = parser.parse_block(0, String::new())?;

    if let Some(line) = lines.get(parser.pos) {
        return Err(ConfigError::Parse {
            line: line.number,
            message: "indentation does not match any open block".to_string(),
        });
    }

    Ok(root)
}

#[derive(Debug)]
struct Line<'a> {
    number: usize,
    indent: usize,
    key: &'a str,
    /// `None` opens a nested block.
    value: Option<&'a str>,
}

fn tokenize(text: &str) -> Result<Vec<Line<'_>>, ConfigError> {
    let mut lines = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let number = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let content = raw.trim_start_matches(' ');
        let indent = raw.len() - content.len();
        if content.starts_with('\t') {
            return Err(ConfigError::Parse {
                line: number,
                message: "tabs are not allowed in indentation".to_string(),
            });
        }

        let content = content.trim_end();
        let Some(colon) = content.find(':') else {
            return Err(ConfigError::Parse {
                line: number,
                message: format!("expected `key: value`, found `{}`", content),
            });
        };

        let key = content[..colon].trim();
        if key.is_empty() || key.starts_with('-') {
            return Err(ConfigError::Parse {
                line: number,
                message: format!("invalid key in `{}`", content),
            });
        }

        let rest = content[colon + 1..].trim();
        let value = if rest.is_empty() || rest.starts_with('#') {
            None
        } else {
            Some(rest)
        };

        lines.push(Line {
            number,
            indent,
            key,
            value,
        });
    }

    Ok(lines)
}

struct Parser<'a> {
    lines: &'a [Line<'a>],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Line<'a>> {
        self.lines.get(self.pos)
    }

    fn parse_block(&mut self, indent: usize, path: String) -> Result<Mapping, ConfigError> {
        let mut mapping = Mapping::new(path);

        while let Some(line) = self.peek() {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(ConfigError::Parse {
                    line: line.number,
                    message: "unexpected indentation".to_string(),
                });
            }
            self.pos += 1;

            let value = match line.value {
                Some(raw) => ConfigValue::Scalar(parse_scalar(raw, line.number)?),
                None => {
                    let child_indent = match self.peek() {
                        Some(next) if next.indent > indent => next.indent,
                        _ => {
                            return Err(ConfigError::Parse {
                                line: line.number,
                                message: format!("`{}` opens an empty block", line.key),
                            })
                        }
                    };
                    let child_path = mapping.child_path(line.key);
                    ConfigValue::Mapping(self.parse_block(child_indent, child_path)?)
                }
            };

            mapping.insert(line.key, value, line.number)?;
        }

        Ok(mapping)
    }
}

fn parse_scalar(raw: &str, line: usize) -> Result<Scalar, ConfigError> {
    let first = raw.chars().next().unwrap_or_default();
    if first == '"' || first == '\'' {
        let inner = &raw[1..];
        let Some(end) = inner.find(first) else {
            return Err(ConfigError::Parse {
                line,
                message: format!("unterminated quoted value `{}`", raw),
            });
        };
        let trailing = inner[end + 1..].trim();
        if !trailing.is_empty() && !trailing.starts_with('#') {
            return Err(ConfigError::Parse {
                line,
                message: format!("unexpected text after quoted value: `{}`", trailing),
            });
        }
        return Ok(Scalar::Str(inner[..end].to_string()));
    }

    let text = match raw.find(" #") {
        Some(pos) => raw[..pos].trim_end(),
        None => raw,
    };

    match text {
        "true" => return Ok(Scalar::Bool(true)),
        "false" => return Ok(Scalar::Bool(false)),
        _ => {}
    }

    let looks_numeric = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if looks_numeric {
        if let Ok(value) = text.parse::<f64>() {
            if value.is_finite() {
                return Ok(Scalar::Number {
                    value,
                    text: text.to_string(),
                });
            }
        }
    }

    Ok(Scalar::Str(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
# Agent registry
version: "1.0"

defaults:
  pass_threshold: 0.85
  max_attempts: 3
  escalate_on_fail: true

agents:
  target_builder:
    description: Build trigger-qualified target lists
    rubric: rubrics/target-builder.yaml  # relative to SYSTEM
    threshold: 0.9
"#;

    #[test]
    fn test_parse_nested_document() {
        let root = parse(REGISTRY).unwrap();

        assert_eq!(root.str_at("version").unwrap(), Some("1.0"));

        let defaults = root.require_mapping("defaults").unwrap();
        assert_eq!(defaults.f64_at("pass_threshold").unwrap(), Some(0.85));
        assert_eq!(defaults.u32_at("max_attempts").unwrap(), Some(3));
        assert_eq!(defaults.bool_at("escalate_on_fail").unwrap(), Some(true));

        let agent = root
            .require_mapping("agents")
            .unwrap()
            .require_mapping("target_builder")
            .unwrap();
        assert_eq!(agent.path(), "agents.target_builder");
        assert_eq!(
            agent.require_str("rubric").unwrap(),
            "rubrics/target-builder.yaml"
        );
        assert_eq!(
            agent.require_str("description").unwrap(),
            "Build trigger-qualified target lists"
        );
    }

    #[test]
    fn test_preserves_key_order() {
        let root = parse("b: 1\na: 2\nc: 3\n").unwrap();
        let keys: Vec<_> = root.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_number_keeps_source_text() {
        let root = parse("version: 1.0\n").unwrap();
        assert_eq!(root.text_at("version").unwrap(), Some("1.0".to_string()));
        assert_eq!(root.f64_at("version").unwrap(), Some(1.0));
    }

    #[test]
    fn test_typed_accessor_rejects_wrong_type() {
        let root = parse("max_attempts: \"3\"\n").unwrap();
        let err = root.u32_at("max_attempts").unwrap_err();
        match err {
            ConfigError::InvalidField { path, message } => {
                assert_eq!(path, "max_attempts");
                assert!(message.contains("expected number"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fractional_integer_rejected() {
        let root = parse("max_attempts: 2.5\n").unwrap();
        assert!(root.u32_at("max_attempts").is_err());
    }

    #[test]
    fn test_rejects_tabs() {
        let err = parse("a:\n\tb: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_rejects_line_without_colon() {
        let err = parse("a:\n  - item\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let err = parse("a: 1\na: 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_rejects_unmatched_dedent() {
        let err = parse("a:\n    b: 1\n  c: 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_rejects_empty_block() {
        let err = parse("a:\nb: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_quoted_value_with_trailing_comment() {
        let root = parse("name: 'hello # not a comment' # comment\n").unwrap();
        assert_eq!(root.str_at("name").unwrap(), Some("hello # not a comment"));
    }

    #[test]
    fn test_nan_and_inf_stay_strings() {
        let root = parse("a: nan\nb: inf\n").unwrap();
        assert_eq!(root.str_at("a").unwrap(), Some("nan"));
        assert_eq!(root.str_at("b").unwrap(), Some("inf"));
    }

    #[test]
    fn test_to_json() {
        let root = parse("inputs:\n  thesis: LATAM fintech\n  limit: 10\n").unwrap();
        let json = ConfigValue::Mapping(root.require_mapping("inputs").unwrap().clone()).to_json();
        assert_eq!(
            json,
            serde_json::json!({"thesis": "LATAM fintech", "limit": 10})
        );
    }
}
