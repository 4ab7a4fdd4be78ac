//! Run state
//!
//! A `RunState` is built once per run and handed by value from step to
//! step; each step returns the updated state. It also owns the run's open
//! sinks so an aborted run releases them when the state is dropped.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::ArgLayers;
use crate::models::{verdict, with_warnings, Progress, RunMode, ScriptOutcome, Severity, Warning};
use crate::results::{SummaryLog, TapSink};
use crate::suite::Expansion;
use crate::utils::SuiteTimer;

pub struct RunState {
    /// Scripts or directories to expand, after rerun resolution
    pub files: Vec<PathBuf>,
    /// Inputs as given by the caller
    pub orig_files: Vec<PathBuf>,
    pub mode: RunMode,
    pub log_dir: PathBuf,
    pub log_root: PathBuf,
    pub rerun: Severity,
    pub html: Severity,
    pub progress: Progress,
    pub layers: ArgLayers,
    pub invocation: Vec<String>,
    pub started_at: DateTime<Utc>,

    pub expansion: Expansion,
    pub outcomes: Vec<ScriptOutcome>,
    pub warnings: Vec<Warning>,
    /// Worst severity seen so far, including severities that were not
    /// recorded as outcomes
    pub running: Severity,
    pub listing: BTreeSet<String>,
    pub doc_suppressed: bool,
    pub timed_out: bool,

    pub summary: Option<SummaryLog>,
    pub tap: Option<TapSink>,
    pub timer: Option<SuiteTimer>,
}

impl RunState {
    pub fn new(files: Vec<PathBuf>, layers: ArgLayers, invocation: Vec<String>) -> Self {
        Self {
            orig_files: files.clone(),
            files,
            mode: RunMode::Execute,
            log_dir: PathBuf::new(),
            log_root: PathBuf::new(),
            rerun: Severity::Disable,
            html: Severity::Success,
            progress: Progress::Brief,
            layers,
            invocation,
            started_at: Utc::now(),
            expansion: Expansion::default(),
            outcomes: Vec::new(),
            warnings: Vec::new(),
            running: Severity::Success,
            listing: BTreeSet::new(),
            doc_suppressed: false,
            timed_out: false,
            summary: None,
            tap: None,
            timer: None,
        }
    }

    /// Fold a severity that is not backed by an outcome
    pub fn aggregate(mut self, severity: Severity) -> Self {
        self.running = self.running.merge(severity);
        self
    }

    pub fn add_warnings(mut self, warnings: &[Warning]) -> Self {
        if let Some(tap) = self.tap.as_mut() {
            for warning in warnings {
                tap.warning(warning);
            }
        }
        self.warnings.extend_from_slice(warnings);
        self
    }

    /// Verdict over everything seen so far
    pub fn verdict(&self) -> Severity {
        let folded = verdict(self.outcomes.iter().map(|o| o.severity), self.mode);
        with_warnings(folded.merge(self.running), self.warnings.len())
    }

    pub fn timer_fired(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| t.fired())
    }

    /// Directory for the per-case logs of a script, mirroring its place
    /// under the suite root
    pub fn case_log_dir(&self, script: &Path) -> PathBuf {
        let relative = script
            .strip_prefix(&self.expansion.root)
            .ok()
            .and_then(Path::parent)
            .unwrap_or(Path::new(""));
        self.log_dir.join(relative)
    }
}
