//! Suite run loop
//!
//! Resolves the configuration, builds the script list, then processes one
//! script at a time: parse, act according to the run mode, record the
//! outcome. The suite timer is checked between scripts.

use chrono::Utc;
use futures::FutureExt;
use regex::Regex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{RunError, RunState};
use crate::config::{expand_path, load_layers, ArgDict, ConfigError, EnvConfig, Layer, MergePass};
use crate::models::{
    position_of, skip_severity, OutcomeDetails, Progress, RunMode, ScriptOutcome, Severity,
};
use crate::output::{doc_lines, Console};
use crate::results::{
    html_path, publish_final, publish_snapshot, write_config_log, write_junit, SuiteFooter,
    SuiteHeader, SummaryLog, TapPreamble, TapSink, EVENT_SUFFIX, LATEST_RUN, SUMMARY_LOG, TAP_LOG,
};
use crate::script::{
    CaseContext, ErrorDetails, ExecResult, ParseOutcome, ParsedScript, ScriptInterpreter,
    ScriptParser,
};
use crate::suite::{absolute, expand, rerun, SuiteEntry};
use crate::utils::{scale_timeout, SuiteTimer, Timer};

const DEFAULT_PATTERN: &str = r"^[^.].*\.lux$";
const DEFAULT_CASE_TIMEOUT: u64 = 300;
const DEFAULT_MULTIPLIER: u64 = 1000;

/// How the run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    SuiteTimeout,
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub verdict: Severity,
    pub log_dir: PathBuf,
    /// Set in the modes that persist a summary log
    pub summary_log: Option<PathBuf>,
    pub outcomes: Vec<ScriptOutcome>,
}

impl RunReport {
    /// Process exit status
    pub fn exit_code(&self) -> i32 {
        if self.status == RunStatus::Completed && self.verdict <= Severity::Warning {
            0
        } else {
            1
        }
    }
}

/// Drives a suite through a parser and an interpreter
pub struct SuiteRunner<P, I> {
    parser: P,
    interpreter: I,
    env: EnvConfig,
    console: Console,
    current: Option<String>,
}

impl<P: ScriptParser, I: ScriptInterpreter> SuiteRunner<P, I> {
    pub fn new(parser: P, interpreter: I) -> Self {
        Self {
            parser,
            interpreter,
            env: EnvConfig::load(),
            console: Console::stdout(Progress::Brief),
            current: None,
        }
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = env;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Run a suite.
    ///
    /// `files` are scripts or directories, or prior run directories when
    /// rerun is enabled. `prev_log_dir` is the rerun source when no files
    /// are given. A panic inside the run is reported as an internal error
    /// after the open logs have been released.
    pub async fn run(
        &mut self,
        files: Vec<PathBuf>,
        user: ArgDict,
        prev_log_dir: Option<PathBuf>,
        invocation: Vec<String>,
    ) -> Result<RunReport, RunError> {
        let result = AssertUnwindSafe(self.run_suite(files, user, prev_log_dir, invocation))
            .catch_unwind()
            .await;

        match result {
            Ok(result) => result,
            Err(panic) => {
                let at = self
                    .current
                    .take()
                    .unwrap_or_else(|| "suite setup".to_string());
                let message = panic_message(panic.as_ref());
                error!("Internal error while processing {}: {}", at, message);
                Err(RunError::Internal(format!(
                    "{message} (while processing {at})"
                )))
            }
        }
    }

    async fn run_suite(
        &mut self,
        files: Vec<PathBuf>,
        user: ArgDict,
        prev_log_dir: Option<PathBuf>,
        invocation: Vec<String>,
    ) -> Result<RunReport, RunError> {
        let state = self.init(files, user, prev_log_dir, invocation)?;
        let state = self.expand(state)?;
        let state = self.open_sinks(state)?;
        let state = self.run_cases(state).await?;
        self.finish(state)
    }

    fn init(
        &mut self,
        files: Vec<PathBuf>,
        user: ArgDict,
        prev_log_dir: Option<PathBuf>,
        invocation: Vec<String>,
    ) -> Result<RunState, RunError> {
        let layers = load_layers(user, &self.env)?;
        let mut state = RunState::new(files, layers, invocation);

        state.mode = state.layers.resolve_parsed("mode", RunMode::Execute)?;
        state.rerun = state.layers.resolve_parsed("rerun", Severity::Disable)?;
        state.html = state.layers.resolve_parsed("html", Severity::Success)?;
        state.progress = state.layers.resolve_parsed("progress", Progress::Brief)?;
        self.console.set_progress(state.progress);

        state.log_root = absolute(&expand_path(
            &state.layers.resolve("log_root", "suite_logs")?,
        ));
        state.log_dir = match state.layers.pick_val("log_dir")?.and_then(|(_, v)| v.last()) {
            Some(dir) => absolute(&expand_path(dir)),
            None => state.log_root.join(
                state
                    .started_at
                    .format("run_%Y_%m_%d_%H_%M_%S_%6f")
                    .to_string(),
            ),
        };
        let internal = MergePass::new().merge_value(
            "log_dir",
            &state.log_dir.to_string_lossy(),
            ArgDict::new(),
        )?;
        state.layers = state.layers.with_layer(Layer::Internal, internal);

        if state.rerun != Severity::Disable {
            let prev = prev_log_dir.or_else(|| latest_run(&state.log_root));
            state.files = rerun::resolve(&state.orig_files, prev.as_deref(), state.rerun)?;
        } else if state.files.is_empty() {
            return Err(RunError::NoInput);
        }

        info!(
            "Running {} input(s) in {} mode, logs in {}",
            state.files.len(),
            state.mode,
            state.log_dir.display()
        );
        Ok(state)
    }

    fn expand(&self, mut state: RunState) -> Result<RunState, RunError> {
        let source = state.layers.resolve("file_pattern", DEFAULT_PATTERN)?;
        let pattern = Regex::new(&source).map_err(|e| ConfigError::BadValue {
            key: "file_pattern".to_string(),
            value: source.clone(),
            reason: e.to_string(),
        })?;
        let prefix = state.layers.resolve("case_prefix", "")?;

        state.expansion = expand(&state.files, &pattern, &prefix);
        debug!(
            "Expanded {} input(s) into {} script(s) under {}",
            state.files.len(),
            state.expansion.len(),
            state.expansion.root.display()
        );
        Ok(state)
    }

    /// Arm the suite timer and, in reporting modes, open the run logs
    fn open_sinks(&self, mut state: RunState) -> Result<RunState, RunError> {
        let suite_timeout = state.layers.resolve_limit("suite_timeout", None)?;
        let multiplier = state
            .layers
            .resolve_parsed("multiplier", DEFAULT_MULTIPLIER)?;
        state.timer = Some(SuiteTimer::arm(scale_timeout(suite_timeout, multiplier)));

        if !state.mode.is_reporting() {
            return Ok(state);
        }

        std::fs::create_dir_all(&state.log_dir).map_err(|e| RunError::file(&state.log_dir, e))?;
        link_latest(&state.log_root, &state.log_dir);
        write_config_log(&state.log_dir, &state.layers, &state.invocation)
            .map_err(|e| RunError::file(&state.log_dir, e))?;

        let header = SuiteHeader {
            started_at: state.started_at,
            mode: state.mode,
            root: state.expansion.root.clone(),
            case_prefix: state.layers.resolve("case_prefix", "")?,
            log_dir: state.log_dir.clone(),
            invocation: state.invocation.clone(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let summary = SummaryLog::create(&state.log_dir, header)
            .map_err(|e| RunError::file(state.log_dir.join(SUMMARY_LOG), e))?;

        let targets = state.layers.resolve_list("tap")?;
        let mut tap = TapSink::open(&state.log_dir, &targets)
            .map_err(|e| RunError::file(state.log_dir.join(TAP_LOG), e))?;
        tap.plan(state.expansion.len());
        tap.preamble(&TapPreamble {
            user_at_host: self.env.user_at_host(),
            cwd: std::env::current_dir().unwrap_or_default(),
            invocation: state.invocation.clone(),
            report: html_path(summary.path()),
        });

        state.summary = Some(summary);
        state.tap = Some(tap);
        Ok(state)
    }

    async fn run_cases(&mut self, mut state: RunState) -> Result<RunState, RunError> {
        let entries = std::mem::take(&mut state.expansion.entries);
        let total = entries.len();

        for (index, entry) in entries.iter().enumerate() {
            if state.timer_fired() {
                state.timed_out = true;
            }
            if state.timed_out {
                warn!(
                    "Suite timeout, skipping {} remaining script(s)",
                    total - index
                );
                break;
            }
            self.current = Some(entry.display.clone());
            state = self.run_case(state, entry, index + 1, total).await?;
        }

        self.current = None;
        state.expansion.entries = entries;
        Ok(state)
    }

    async fn run_case(
        &mut self,
        state: RunState,
        entry: &SuiteEntry,
        seq: usize,
        total: usize,
    ) -> Result<RunState, RunError> {
        debug!("Processing {}", entry.display);

        if let Some(message) = &entry.error {
            if state.mode.is_enumeration() {
                self.console.diagnostic(&entry.display, "0", message);
            }
            let outcome = ScriptOutcome::error(&entry.path, &entry.display, "0", message.clone());
            return self.record(state, entry, seq, total, outcome);
        }

        let opts = state.layers.effective_opts()?;
        match self.parser.parse(&entry.path, &opts) {
            ParseOutcome::Skip { reason, stack } => {
                if state.mode.is_enumeration() {
                    debug!("{}: {}", entry.display, reason);
                    return Ok(state.aggregate(skip_severity(&reason)));
                }
                let unstable = state.layers.resolve_bool("unstable", false)?;
                let outcome =
                    ScriptOutcome::skip(&entry.path, &entry.display, position_of(&stack), &reason)
                        .unstable(unstable);
                self.record(state, entry, seq, total, outcome)
            }
            ParseOutcome::Error { stack, message } => {
                let position = position_of(&stack);
                let message = match stack.last() {
                    Some(pos) if pos.file != entry.path => {
                        format!("{}: {}", pos.file.display(), message)
                    }
                    _ => message,
                };
                if state.mode.is_enumeration() {
                    self.console.diagnostic(&entry.display, &position, &message);
                }
                let outcome = ScriptOutcome::error(&entry.path, &entry.display, position, message);
                self.record(state, entry, seq, total, outcome)
            }
            ParseOutcome::Parsed(parsed) => self.run_parsed(state, entry, seq, total, parsed).await,
        }
    }

    async fn run_parsed(
        &mut self,
        state: RunState,
        entry: &SuiteEntry,
        seq: usize,
        total: usize,
        parsed: ParsedScript,
    ) -> Result<RunState, RunError> {
        let case_layers = state
            .layers
            .clone()
            .with_layer(Layer::File, ArgDict::from_opts(&parsed.opts)?);
        let warnings: Vec<String> = parsed.warnings.iter().map(|w| w.to_string()).collect();
        let mut state = state.add_warnings(&parsed.warnings);
        let success = ScriptOutcome::success(&entry.path, &entry.display);

        match state.mode {
            RunMode::List | RunMode::ListDir => {
                let item = if state.mode == RunMode::List {
                    entry.display.clone()
                } else {
                    parent_display(&entry.display)
                };
                state.listing.insert(item);
                self.record(state, entry, seq, total, success.with_warnings(warnings))
            }
            RunMode::Doc => {
                let docs: Vec<_> = parsed.docs().cloned().collect();
                if !state.doc_suppressed {
                    let depth = case_layers.resolve_limit("doc_depth", None)?;
                    let lines = doc_lines(&entry.display, &docs, depth);
                    self.console.doc(&lines);
                    if depth == Some(0) && !lines.is_empty() {
                        state.doc_suppressed = true;
                    }
                }
                let outcome = success
                    .with_details(OutcomeDetails::Doc(docs))
                    .with_warnings(warnings);
                self.record(state, entry, seq, total, outcome)
            }
            RunMode::Validate => {
                self.record(state, entry, seq, total, success.with_warnings(warnings))
            }
            RunMode::Execute => {
                let unstable = case_layers.resolve_bool("unstable", false)?;
                let case_timeout = case_layers.resolve_limit("case_timeout", Some(DEFAULT_CASE_TIMEOUT))?;
                let multiplier = case_layers.resolve_parsed("multiplier", DEFAULT_MULTIPLIER)?;

                let case_log_dir = state.case_log_dir(&entry.path);
                let base_name = entry
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let event_log = case_log_dir.join(format!("{base_name}{EVENT_SUFFIX}"));
                let ctx = CaseContext {
                    display: entry.display.clone(),
                    case_log_dir,
                    event_log: event_log.clone(),
                    opts: case_layers.effective_opts()?,
                    case_timeout: scale_timeout(case_timeout, multiplier),
                    suite_deadline: state.timer.as_ref().and_then(SuiteTimer::deadline),
                };

                let timer = Timer::start(&entry.display);
                let result = self.interpreter.run(&entry.path, &parsed, &ctx).await;
                let duration = timer.stop();

                let outcome = match result {
                    ExecResult::Failed {
                        details: ErrorDetails::SuiteTimeout,
                        warnings: raised,
                        ..
                    } => {
                        warn!("Suite timeout while running {}", entry.display);
                        let mut state = state.add_warnings(&raised);
                        state.timed_out = true;
                        return Ok(state);
                    }
                    ExecResult::Completed {
                        severity,
                        position,
                        warnings: raised,
                        events,
                        ..
                    } => {
                        state = state.add_warnings(&raised);
                        let outcome = if severity == Severity::Skip {
                            let reason = events
                                .last()
                                .cloned()
                                .unwrap_or_else(|| "SKIP by interpreter".to_string());
                            ScriptOutcome::skip(&entry.path, &entry.display, position, &reason)
                        } else {
                            ScriptOutcome::with_severity(severity, &entry.path, &entry.display)
                                .with_position(position)
                        };
                        let outcome = if events.is_empty() {
                            outcome
                        } else {
                            outcome.with_details(OutcomeDetails::Events(events))
                        };
                        outcome.with_warnings(join_warnings(warnings, &raised))
                    }
                    ExecResult::Failed {
                        position,
                        warnings: raised,
                        details: ErrorDetails::Message(message),
                        ..
                    } => {
                        state = state.add_warnings(&raised);
                        ScriptOutcome::error(&entry.path, &entry.display, position, message)
                            .with_warnings(join_warnings(warnings, &raised))
                    }
                };

                let outcome = if event_log.is_file() {
                    outcome.with_event_log(event_log)
                } else {
                    outcome
                };
                let outcome = outcome.with_duration(duration).unstable(unstable);
                self.record(state, entry, seq, total, outcome)
            }
        }
    }

    /// Append an outcome to the run and feed it to the open sinks
    fn record(
        &mut self,
        mut state: RunState,
        entry: &SuiteEntry,
        seq: usize,
        total: usize,
        outcome: ScriptOutcome,
    ) -> Result<RunState, RunError> {
        state.running = state.running.merge(outcome.severity);

        if let Some(summary) = state.summary.as_mut() {
            summary
                .append(&entry.input, &outcome)
                .and_then(|_| summary.flush())
                .map_err(|e| RunError::file(summary.path(), e))?;
        }
        if let Some(tap) = state.tap.as_mut() {
            tap.test(&outcome);
        }

        if state.mode.is_reporting() {
            self.console
                .case_result(seq, total, state.expansion.max_width, &outcome);
            if state.running.meets(state.html) {
                if let Some(summary) = &state.summary {
                    if let Err(e) = publish_snapshot(summary.path()) {
                        warn!("Failed to publish snapshot: {:#}", e);
                    }
                }
            }
        }

        state.outcomes.push(outcome);
        Ok(state)
    }

    fn finish(&mut self, mut state: RunState) -> Result<RunReport, RunError> {
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        let verdict = state.verdict();

        if matches!(state.mode, RunMode::List | RunMode::ListDir) {
            self.console.listing(&state.listing);
        }

        if let Some(tap) = state.tap.take() {
            if state.timed_out {
                tap.bail_out("Suite timeout");
            } else {
                tap.close(verdict);
            }
        }

        let summary_log = match state.summary.take() {
            Some(summary) => {
                let footer = SuiteFooter {
                    completed_at: Utc::now(),
                    verdict,
                    timed_out: state.timed_out,
                };
                let path = summary
                    .close(footer)
                    .map_err(|e| RunError::file(state.log_dir.join(SUMMARY_LOG), e))?;
                Some(path)
            }
            None => None,
        };

        if let Some(path) = &summary_log {
            if verdict.meets(state.html) {
                match publish_final(path) {
                    Ok(report) => self.console.report_ref(&report),
                    Err(e) => warn!("Failed to render HTML report: {:#}", e),
                }
            }
            if state.layers.resolve_bool("junit", false)? {
                if let Err(e) = write_junit(path, &state.log_dir) {
                    warn!("Failed to write JUnit report: {:#}", e);
                }
            }
            self.console
                .summary(&state.outcomes, verdict, state.timed_out);
        }

        info!(
            "Suite finished: {} script(s), verdict {}{}",
            state.outcomes.len(),
            verdict,
            if state.timed_out { " (suite timeout)" } else { "" }
        );

        Ok(RunReport {
            status: if state.timed_out {
                RunStatus::SuiteTimeout
            } else {
                RunStatus::Completed
            },
            verdict,
            log_dir: state.log_dir.clone(),
            summary_log,
            outcomes: std::mem::take(&mut state.outcomes),
        })
    }
}

fn join_warnings(mut parsed: Vec<String>, raised: &[crate::models::Warning]) -> Vec<String> {
    parsed.extend(raised.iter().map(|w| w.to_string()));
    parsed
}

/// Directory part of a display path
fn parent_display(display: &str) -> String {
    match Path::new(display).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.display().to_string(),
        _ => ".".to_string(),
    }
}

fn latest_run(log_root: &Path) -> Option<PathBuf> {
    let link = log_root.join(LATEST_RUN);
    link.exists().then_some(link)
}

/// Point `latest_run` in the log root at this run
fn link_latest(log_root: &Path, log_dir: &Path) {
    let link = log_root.join(LATEST_RUN);
    if !log_dir.starts_with(log_root) {
        return;
    }
    if std::fs::symlink_metadata(&link).is_ok() {
        if let Err(e) = std::fs::remove_file(&link) {
            warn!("Failed to replace {}: {}", link.display(), e);
            return;
        }
    }
    #[cfg(unix)]
    if let Err(e) = std::os::unix::fs::symlink(log_dir, &link) {
        warn!("Failed to link {}: {}", link.display(), e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
