//! External-command script interpreter
//!
//! Runs the configured `interpreter` program with `interpreter_args` and the
//! script path, in the script's directory, with `var` assignments exported
//! to its environment. Output is written to the case event log.
//!
//! Exit status 0 is success, 77 skip, 1 fail and anything else an error.
//! Output lines `WARNING: text` raise warnings and `POSITION: n` moves the
//! reported position.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{sleep, sleep_until};
use tracing::{debug, warn};

use super::{CaseContext, ErrorDetails, ExecResult, ParsedScript, ScriptInterpreter};
use crate::config::Opts;
use crate::models::{Severity, Warning};

const SKIP_STATUS: i32 = 77;

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandInterpreter;

impl CommandInterpreter {
    pub fn new() -> Self {
        Self
    }
}

fn values<'a>(opts: &'a Opts, key: &'a str) -> impl Iterator<Item = &'a str> {
    opts.iter()
        .filter(move |(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl ScriptInterpreter for CommandInterpreter {
    async fn run(&self, script: &Path, _parsed: &ParsedScript, ctx: &CaseContext) -> ExecResult {
        let failed = |details: ErrorDetails, warnings: Vec<Warning>| ExecResult::Failed {
            position: "0".to_string(),
            case_log_dir: ctx.case_log_dir.clone(),
            warnings,
            details,
        };

        let program = match values(&ctx.opts, "interpreter").last() {
            Some(program) if !program.is_empty() => program.to_string(),
            _ => {
                return failed(
                    ErrorDetails::Message("No interpreter configured".to_string()),
                    Vec::new(),
                )
            }
        };

        if let Err(e) = std::fs::create_dir_all(&ctx.case_log_dir) {
            return failed(
                ErrorDetails::Message(format!(
                    "Failed to create {}: {}",
                    ctx.case_log_dir.display(),
                    e
                )),
                Vec::new(),
            );
        }

        let mut command = Command::new(&program);
        command
            .args(values(&ctx.opts, "interpreter_args"))
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = script.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        for assignment in values(&ctx.opts, "var") {
            if let Some((name, value)) = assignment.split_once('=') {
                command.env(name, value);
            }
        }

        debug!("Spawning {} for {}", program, ctx.display);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return failed(
                    ErrorDetails::Message(format!("Failed to start {program}: {e}")),
                    Vec::new(),
                )
            }
        };

        let case_limit = async {
            match ctx.case_timeout {
                Some(limit) => sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        let suite_limit = async {
            match ctx.suite_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let output = tokio::select! {
            output = child.wait_with_output() => output,
            _ = case_limit => {
                write_event_log(ctx, "case timeout\n");
                return ExecResult::Completed {
                    severity: Severity::Fail,
                    position: "0".to_string(),
                    case_log_dir: ctx.case_log_dir.clone(),
                    warnings: Vec::new(),
                    events: vec!["case timeout".to_string()],
                };
            }
            _ = suite_limit => {
                write_event_log(ctx, "suite timeout\n");
                return failed(ErrorDetails::SuiteTimeout, Vec::new());
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return failed(
                    ErrorDetails::Message(format!("Failed to wait for {program}: {e}")),
                    Vec::new(),
                )
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        write_event_log(ctx, &format!("{stdout}{stderr}"));

        let mut position = "0".to_string();
        let mut warnings = Vec::new();
        for line in stdout.lines() {
            if let Some(pos) = line.strip_prefix("POSITION:") {
                position = pos.trim().to_string();
            } else if let Some(message) = line.strip_prefix("WARNING:") {
                warnings.push(Warning::new(script, position.clone(), message.trim()));
            }
        }
        let events: Vec<String> = stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();

        let severity = match output.status.code() {
            Some(0) => Severity::Success,
            Some(SKIP_STATUS) => Severity::Skip,
            Some(1) => Severity::Fail,
            _ => {
                let message = events
                    .last()
                    .cloned()
                    .unwrap_or_else(|| format!("{program} exited with {}", output.status));
                return ExecResult::Failed {
                    position,
                    case_log_dir: ctx.case_log_dir.clone(),
                    warnings,
                    details: ErrorDetails::Message(message),
                };
            }
        };

        ExecResult::Completed {
            severity,
            position,
            case_log_dir: ctx.case_log_dir.clone(),
            warnings,
            events,
        }
    }
}

fn write_event_log(ctx: &CaseContext, content: &str) {
    if let Err(e) = std::fs::write(&ctx.event_log, content) {
        warn!("Failed to write {}: {}", ctx.event_log.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::time::Instant;

    fn setup(body: &str) -> (TempDir, PathBuf, CaseContext) {
        let dir = tempdir().unwrap();
        let script = dir.path().join("case.lux");
        std::fs::write(&script, body).unwrap();
        let case_log_dir = dir.path().join("logs");
        let ctx = CaseContext {
            display: "case.lux".to_string(),
            event_log: case_log_dir.join("case.lux.event.log"),
            case_log_dir,
            opts: vec![("interpreter".to_string(), "sh".to_string())],
            case_timeout: None,
            suite_deadline: None,
        };
        (dir, script, ctx)
    }

    #[tokio::test]
    async fn test_success_with_warning_and_position() {
        let (_dir, script, ctx) = setup("echo POSITION: 4\necho WARNING: slow prompt\nexit 0\n");
        let result = CommandInterpreter::new()
            .run(&script, &ParsedScript::default(), &ctx)
            .await;

        match result {
            ExecResult::Completed {
                severity,
                position,
                warnings,
                ..
            } => {
                assert_eq!(severity, Severity::Success);
                assert_eq!(position, "4");
                assert_eq!(warnings.len(), 1);
                assert_eq!(warnings[0].message, "slow prompt");
            }
            other => panic!("unexpected {other:?}"),
        }
        let log = std::fs::read_to_string(&ctx.event_log).unwrap();
        assert!(log.contains("WARNING: slow prompt"));
    }

    #[tokio::test]
    async fn test_exit_status_mapping() {
        for (code, expected) in [(1, Severity::Fail), (77, Severity::Skip)] {
            let (_dir, script, ctx) = setup(&format!("exit {code}\n"));
            match CommandInterpreter::new()
                .run(&script, &ParsedScript::default(), &ctx)
                .await
            {
                ExecResult::Completed { severity, .. } => assert_eq!(severity, expected),
                other => panic!("unexpected {other:?}"),
            }
        }

        let (_dir, script, ctx) = setup("echo broken >&2\nexit 3\n");
        match CommandInterpreter::new()
            .run(&script, &ParsedScript::default(), &ctx)
            .await
        {
            ExecResult::Failed { details, .. } => {
                assert_eq!(details, ErrorDetails::Message("broken".to_string()))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vars_exported() {
        let (_dir, script, mut ctx) = setup("test \"$TARGET\" = arm || exit 1\n");
        ctx.opts.push(("var".to_string(), "TARGET=arm".to_string()));
        match CommandInterpreter::new()
            .run(&script, &ParsedScript::default(), &ctx)
            .await
        {
            ExecResult::Completed { severity, .. } => assert_eq!(severity, Severity::Success),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_case_timeout_fails() {
        let (_dir, script, mut ctx) = setup("sleep 5\n");
        ctx.case_timeout = Some(Duration::from_millis(50));
        match CommandInterpreter::new()
            .run(&script, &ParsedScript::default(), &ctx)
            .await
        {
            ExecResult::Completed { severity, .. } => assert_eq!(severity, Severity::Fail),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_suite_deadline() {
        let (_dir, script, mut ctx) = setup("sleep 5\n");
        ctx.suite_deadline = Some(Instant::now() + Duration::from_millis(50));
        let result = CommandInterpreter::new()
            .run(&script, &ParsedScript::default(), &ctx)
            .await;
        assert!(matches!(
            result,
            ExecResult::Failed {
                details: ErrorDetails::SuiteTimeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let (_dir, script, mut ctx) = setup("exit 0\n");
        ctx.opts.clear();
        let result = CommandInterpreter::new()
            .run(&script, &ParsedScript::default(), &ctx)
            .await;
        assert!(matches!(
            result,
            ExecResult::Failed {
                details: ErrorDetails::Message(_),
                ..
            }
        ));
    }
}
