//! Script outcome models
//!
//! One `ScriptOutcome` is recorded per processed script and never changed
//! afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::Severity;

/// Skip reasons with this prefix classify the skip as a failure
pub const FAIL_PREFIX: &str = "FAIL";

/// Position inside a script file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePos {
    pub file: PathBuf,
    pub lineno: usize,
}

impl FilePos {
    pub fn new(file: impl Into<PathBuf>, lineno: usize) -> Self {
        Self {
            file: file.into(),
            lineno,
        }
    }
}

/// Render a position stack (outermost first) as a locator string
pub fn position_of(stack: &[FilePos]) -> String {
    if stack.is_empty() {
        return "0".to_string();
    }
    stack
        .iter()
        .map(|pos| pos.lineno.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

/// Deepest documentation level a script may declare
pub const MAX_DOC_LEVEL: u32 = 16;

/// A documentation line extracted from a script
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocLine {
    pub level: u32,
    pub text: String,
}

/// A warning raised while parsing or running a script
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub script: PathBuf,
    pub position: String,
    pub message: String,
}

impl Warning {
    pub fn new(script: &Path, position: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            script: script.to_path_buf(),
            position: position.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.script.display(),
            self.position,
            self.message
        )
    }
}

/// Free-form payload attached to an outcome
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutcomeDetails {
    #[default]
    None,
    Text(String),
    Events(Vec<String>),
    Doc(Vec<DocLine>),
}

impl OutcomeDetails {
    pub fn is_none(&self) -> bool {
        matches!(self, OutcomeDetails::None)
    }

    /// Single-line rendering used by TAP and progress output
    pub fn summary_line(&self) -> Option<String> {
        match self {
            OutcomeDetails::None => None,
            OutcomeDetails::Text(text) => text.lines().next().map(str::to_string),
            OutcomeDetails::Events(events) => events.last().cloned(),
            OutcomeDetails::Doc(lines) => lines.first().map(|l| l.text.clone()),
        }
    }
}

/// Result of processing one script
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub severity: Severity,
    pub script: PathBuf,
    pub display: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "OutcomeDetails::is_none")]
    pub details: OutcomeDetails,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,
    #[serde(default)]
    pub unstable: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ScriptOutcome {
    fn new(severity: Severity, script: &Path, display: &str, position: impl Into<String>) -> Self {
        Self {
            severity,
            script: script.to_path_buf(),
            display: display.to_string(),
            position: position.into(),
            details: OutcomeDetails::None,
            warnings: Vec::new(),
            skip_reason: None,
            event_log: None,
            unstable: false,
            duration_ms: 0,
        }
    }

    pub fn success(script: &Path, display: &str) -> Self {
        Self::new(Severity::Success, script, display, "0")
    }

    /// A skipped script; reasons starting with `FAIL` count as failures
    pub fn skip(script: &Path, display: &str, position: impl Into<String>, reason: &str) -> Self {
        let mut outcome = Self::new(skip_severity(reason), script, display, position);
        outcome.skip_reason = Some(reason.to_string());
        outcome.details = OutcomeDetails::Text(reason.to_string());
        outcome
    }

    pub fn error(
        script: &Path,
        display: &str,
        position: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::new(Severity::Error, script, display, position);
        outcome.details = OutcomeDetails::Text(message.into());
        outcome
    }

    pub fn with_severity(severity: Severity, script: &Path, display: &str) -> Self {
        Self::new(severity, script, display, "0")
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = position.into();
        self
    }

    pub fn with_details(mut self, details: OutcomeDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_event_log(mut self, event_log: impl Into<PathBuf>) -> Self {
        self.event_log = Some(event_log.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn unstable(mut self, unstable: bool) -> Self {
        self.unstable = unstable;
        self
    }

    /// Attach warnings, raising the severity to at least `warning`
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.severity = super::severity::with_warnings(self.severity, warnings.len());
        self.warnings = warnings;
        self
    }

    /// Whether the skip reason used the `FAIL` prefix
    pub fn is_failed_skip(&self) -> bool {
        self.skip_reason
            .as_deref()
            .is_some_and(|r| r.starts_with(FAIL_PREFIX))
    }
}

impl fmt::Display for ScriptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.severity.symbol(),
            self.display,
            self.severity
        )?;
        if self.position != "0" {
            write!(f, " at line {}", self.position)?;
        }
        if let Some(line) = self.details.summary_line() {
            write!(f, " - {line}")?;
        }
        Ok(())
    }
}

/// Severity of a skip reason
pub fn skip_severity(reason: &str) -> Severity {
    if reason.starts_with(FAIL_PREFIX) {
        Severity::Fail
    } else {
        Severity::Skip
    }
}
