use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Phase of an attempt that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Produce,
    Revise,
    Evaluate,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Produce => "produce",
            Phase::Revise => "revise",
            Phase::Evaluate => "evaluate",
        };
        f.write_str(s)
    }
}

/// Structured log events for the producer/evaluator/reviser loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    LoopStarted {
        cycle_id: String,
        agent_name: String,
        pass_threshold: f64,
        max_attempts: u32,
        output_dir: PathBuf,
    },
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    ProducerStarted {
        attempt: u32,
    },
    ReviserStarted {
        attempt: u32,
    },
    ArtifactSaved {
        attempt: u32,
        path: PathBuf,
        bytes: usize,
        /// Hex SHA-256 of the artifact body
        digest: String,
    },
    EvaluatorStarted {
        attempt: u32,
    },
    RepairRequested {
        attempt: u32,
        reason: String,
    },
    EvaluationSaved {
        attempt: u32,
        path: PathBuf,
    },
    EvaluationCompleted {
        attempt: u32,
        score: f64,
        threshold: f64,
        passed: bool,
        duration_ms: u64,
    },
    AttemptFailed {
        attempt: u32,
        score: f64,
        feedback: String,
        suggested_fixes: Vec<String>,
    },
    AttemptErrored {
        attempt: u32,
        phase: Phase,
        error: String,
    },
    MirrorWriteFailed {
        attempt: u32,
        error: String,
    },
    LoopPassed {
        attempt: u32,
        score: f64,
        final_path: PathBuf,
    },
    LoopExhausted {
        attempts: u32,
        reason: String,
        escalated: bool,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for loop events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    console: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            console: true,
            file_writer: Some(Mutex::new(file)),
        })
    }

    /// Disable console output, keeping only the file sink (if any)
    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stdout(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stdout = std::io::stdout();
        match event {
            LogEvent::LoopStarted {
                cycle_id,
                agent_name,
                pass_threshold,
                max_attempts,
                output_dir,
            } => {
                let _ = writeln!(stdout);
                let _ = writeln!(
                    stdout,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stdout,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "gradeloops".bold().bright_white(),
                    " ".repeat(57) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stdout,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Agent:".dimmed(),
                    Self::truncate_with_padding(agent_name, 58, 68).dimmed()
                );
                let _ = writeln!(
                    stdout,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Cycle:".dimmed(),
                    Self::truncate_with_padding(cycle_id, 58, 68).dimmed()
                );
                let limits = format!("threshold {:.2}, max {} attempts", pass_threshold, max_attempts);
                let _ = writeln!(
                    stdout,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Rules:".dimmed(),
                    Self::truncate_with_padding(&limits, 58, 68).dimmed()
                );
                let _ = writeln!(
                    stdout,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Output:".dimmed(),
                    Self::truncate_with_padding(&output_dir.display().to_string(), 57, 67)
                        .dimmed()
                );
                let _ = writeln!(
                    stdout,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stdout);
            }
            LogEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                let text = format!("─ Attempt {}/{} ", attempt, max_attempts);
                let padding = "─".repeat(67usize.saturating_sub(text.chars().count()));
                let _ = writeln!(
                    stdout,
                    "{}{}{}",
                    "┌".bright_blue(),
                    text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stdout);
            }
            LogEvent::ProducerStarted { .. } => {
                let _ = writeln!(
                    stdout,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "PRODUCER".bright_cyan().bold()
                );
            }
            LogEvent::ReviserStarted { .. } => {
                let _ = writeln!(
                    stdout,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "REVISER".bright_cyan().bold()
                );
            }
            LogEvent::ArtifactSaved {
                path,
                bytes,
                digest,
                ..
            } => {
                let short = &digest[..digest.len().min(12)];
                let _ = writeln!(
                    stdout,
                    "    {} Saved {} ({} bytes, {})",
                    "✓".bright_green(),
                    path.display(),
                    bytes,
                    short.dimmed()
                );
                let _ = writeln!(stdout);
            }
            LogEvent::EvaluatorStarted { .. } => {
                let _ = writeln!(
                    stdout,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "EVALUATOR".bright_magenta().bold()
                );
            }
            LogEvent::RepairRequested { reason, .. } => {
                let _ = writeln!(
                    stdout,
                    "    {} Invalid evaluation, requesting repair: {}",
                    "↻".bright_yellow(),
                    reason.dimmed()
                );
            }
            LogEvent::EvaluationSaved { path, .. } => {
                let _ = writeln!(
                    stdout,
                    "    {} {}",
                    "📄".dimmed(),
                    path.display().to_string().dimmed()
                );
            }
            LogEvent::EvaluationCompleted {
                score,
                threshold,
                passed,
                duration_ms,
                ..
            } => {
                let line = format!(
                    "Score {:.2} (threshold {:.2}, {:.1}s)",
                    score,
                    threshold,
                    *duration_ms as f64 / 1000.0
                );
                if *passed {
                    let _ = writeln!(stdout, "    {}", format!("✓ {}", line).bright_green());
                } else {
                    let _ = writeln!(stdout, "    {}", format!("→ {}", line).bright_yellow());
                }
                let _ = writeln!(stdout);
            }
            LogEvent::AttemptFailed {
                feedback,
                suggested_fixes,
                ..
            } => {
                let _ = writeln!(stdout, "    {} {}", "Feedback:".dimmed(), feedback);
                for fix in suggested_fixes {
                    let _ = writeln!(stdout, "    {} {}", "•".dimmed(), fix);
                }
                let _ = writeln!(stdout);
                let _ = writeln!(
                    stdout,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stdout);
            }
            LogEvent::AttemptErrored {
                attempt,
                phase,
                error,
            } => {
                let _ = writeln!(
                    stdout,
                    "    {} Attempt {} failed during {}: {}",
                    "✗".bright_red(),
                    attempt,
                    phase,
                    error.bright_red()
                );
                let _ = writeln!(stdout);
                let _ = writeln!(
                    stdout,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stdout);
            }
            LogEvent::MirrorWriteFailed { error, .. } => {
                let _ = writeln!(
                    stdout,
                    "    {} Run mirror unavailable: {}",
                    "⚠".bright_yellow(),
                    error.dimmed()
                );
            }
            LogEvent::LoopPassed { .. } => {
                let _ = writeln!(
                    stdout,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stdout);
                // The outcome summary is printed by the binary
            }
            LogEvent::LoopExhausted { reason, .. } => {
                let _ = writeln!(stdout, "{} {}", "⚠".bright_yellow(), reason);
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stdout = std::io::stdout();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::LoopStarted {
                cycle_id,
                agent_name,
                ..
            } => format!("[{}] loop:start {} {}", timestamp, cycle_id, agent_name),
            LogEvent::AttemptStarted { attempt, .. } => {
                format!("[{}] attempt:start:{}", timestamp, attempt)
            }
            LogEvent::ProducerStarted { attempt } => {
                format!("[{}] producer:start:{}", timestamp, attempt)
            }
            LogEvent::ReviserStarted { attempt } => {
                format!("[{}] reviser:start:{}", timestamp, attempt)
            }
            LogEvent::ArtifactSaved {
                attempt,
                bytes,
                digest,
                ..
            } => format!(
                "[{}] artifact:{} {}b {}",
                timestamp,
                attempt,
                bytes,
                &digest[..digest.len().min(12)]
            ),
            LogEvent::EvaluatorStarted { attempt } => {
                format!("[{}] evaluator:start:{}", timestamp, attempt)
            }
            LogEvent::RepairRequested { attempt, .. } => {
                format!("[{}] evaluator:repair:{}", timestamp, attempt)
            }
            LogEvent::EvaluationSaved { .. } => return,
            LogEvent::EvaluationCompleted {
                attempt,
                score,
                passed,
                ..
            } => format!(
                "[{}] evaluator:done:{} score={:.2} {}",
                timestamp,
                attempt,
                score,
                if *passed { "pass" } else { "fail" }
            ),
            LogEvent::AttemptFailed { attempt, score, .. } => {
                format!("[{}] attempt:fail:{} score={:.2}", timestamp, attempt, score)
            }
            LogEvent::AttemptErrored {
                attempt,
                phase,
                error,
            } => format!("[{}] error:{}:{}:{}", timestamp, attempt, phase, error),
            LogEvent::MirrorWriteFailed { attempt, error } => {
                format!("[{}] mirror:error:{}:{}", timestamp, attempt, error)
            }
            LogEvent::LoopPassed { attempt, score, .. } => {
                format!("[{}] loop:pass:{} score={:.2}", timestamp, attempt, score)
            }
            LogEvent::LoopExhausted {
                attempts,
                escalated,
                ..
            } => format!(
                "[{}] loop:exhausted:{}{}",
                timestamp,
                attempts,
                if *escalated { " escalated" } else { "" }
            ),
        };
        let _ = writeln!(stdout, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}
