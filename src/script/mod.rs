//! Script collaborators
//!
//! The run loop consults a parser and, in execute mode, an interpreter for
//! every script. Both sit behind the traits below; the crate bundles a
//! header-directive parser and an external-command interpreter.

mod command;
mod header;

pub use command::CommandInterpreter;
pub use header::HeaderParser;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Opts;
use crate::models::{DocLine, FilePos, Severity, Warning};

/// One command of a parsed script
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptCommand {
    pub file: PathBuf,
    pub lineno: usize,
    pub text: String,
    /// Set for documentation commands
    pub doc: Option<DocLine>,
}

/// A script accepted by the parser
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedScript {
    pub commands: Vec<ScriptCommand>,
    /// Options the script declares for itself (the file layer)
    pub opts: Opts,
    pub warnings: Vec<Warning>,
}

impl ParsedScript {
    /// Documentation lines in script order
    pub fn docs(&self) -> impl Iterator<Item = &DocLine> {
        self.commands.iter().filter_map(|c| c.doc.as_ref())
    }
}

/// Result of parsing one script
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(ParsedScript),
    /// The script asked not to be run. Reasons starting with `FAIL` count
    /// as failures.
    Skip {
        reason: String,
        stack: Vec<FilePos>,
    },
    /// Outermost position first
    Error {
        stack: Vec<FilePos>,
        message: String,
    },
}

pub trait ScriptParser {
    /// Parse a script under the currently effective options
    fn parse(&self, script: &Path, opts: &Opts) -> ParseOutcome;
}

/// Per-case timing and logging context handed to the interpreter
#[derive(Clone, Debug)]
pub struct CaseContext {
    pub display: String,
    pub case_log_dir: PathBuf,
    pub event_log: PathBuf,
    /// Resolved per-case options
    pub opts: Opts,
    pub case_timeout: Option<Duration>,
    pub suite_deadline: Option<Instant>,
}

/// Why an execution ended abnormally
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorDetails {
    /// The suite deadline passed while the script ran
    SuiteTimeout,
    Message(String),
}

/// Result of executing one script
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecResult {
    Completed {
        severity: Severity,
        position: String,
        case_log_dir: PathBuf,
        warnings: Vec<Warning>,
        events: Vec<String>,
    },
    Failed {
        position: String,
        case_log_dir: PathBuf,
        warnings: Vec<Warning>,
        details: ErrorDetails,
    },
}

#[allow(async_fn_in_trait)]
pub trait ScriptInterpreter {
    /// Run one parsed script to completion
    async fn run(&self, script: &Path, parsed: &ParsedScript, ctx: &CaseContext) -> ExecResult;
}
