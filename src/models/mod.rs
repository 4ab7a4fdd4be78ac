//! Data models for suite runs
//!
//! Severities, run modes and script outcomes shared by every component.

mod mode;
mod outcome;
mod severity;

pub use mode::{Progress, RunMode};
pub use outcome::{
    position_of, skip_severity, DocLine, FilePos, OutcomeDetails, ScriptOutcome, Warning,
    MAX_DOC_LEVEL,
};
pub use severity::{verdict, with_warnings, Severity};
