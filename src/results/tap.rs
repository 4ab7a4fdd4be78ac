//! TAP stream output
//!
//! Emits the suite as a Test Anything Protocol stream to `tap.log` in the
//! run directory and to any extra configured targets.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::TAP_LOG;
use crate::models::{ScriptOutcome, Severity, Warning};

/// Diagnostic lines written after the plan
#[derive(Clone, Debug, Default)]
pub struct TapPreamble {
    pub user_at_host: String,
    pub cwd: PathBuf,
    pub invocation: Vec<String>,
    pub report: PathBuf,
}

/// Open TAP stream. Dropping an unclosed sink bails out the stream.
pub struct TapSink {
    writers: Vec<(String, Box<dyn Write + Send>)>,
    counts: BTreeMap<Severity, usize>,
    next: usize,
    closed: bool,
}

impl TapSink {
    /// Open `tap.log` in the run directory plus the extra targets
    /// (`stdout`, `stderr` or a file path)
    pub fn open(log_dir: &Path, targets: &[String]) -> io::Result<Self> {
        let mut writers: Vec<(String, Box<dyn Write + Send>)> = Vec::new();
        let log = log_dir.join(TAP_LOG);
        writers.push((
            log.display().to_string(),
            Box::new(BufWriter::new(File::create(&log)?)),
        ));

        for target in targets {
            let writer: Box<dyn Write + Send> = match target.as_str() {
                "stdout" => Box::new(io::stdout()),
                "stderr" => Box::new(io::stderr()),
                path => Box::new(BufWriter::new(File::create(path)?)),
            };
            writers.push((target.clone(), writer));
        }

        debug!("TAP targets: {}", writers.len());
        Ok(Self::from_writers(writers))
    }

    pub fn from_writers(writers: Vec<(String, Box<dyn Write + Send>)>) -> Self {
        Self {
            writers,
            counts: BTreeMap::new(),
            next: 1,
            closed: false,
        }
    }

    pub fn plan(&mut self, count: usize) {
        self.write_line(&format!("1..{count}"));
    }

    pub fn preamble(&mut self, preamble: &TapPreamble) {
        self.write_line(&format!("# Suite started by {}", preamble.user_at_host));
        self.write_line(&format!("# Working directory: {}", preamble.cwd.display()));
        self.write_line(&format!("# Invocation: {}", preamble.invocation.join(" ")));
        self.write_line(&format!("# Report: {}", preamble.report.display()));
    }

    /// One test line per outcome
    pub fn test(&mut self, outcome: &ScriptOutcome) {
        let number = self.next;
        self.next += 1;
        *self.counts.entry(outcome.severity).or_default() += 1;

        self.write_line(&test_line(number, outcome));
        if matches!(outcome.severity, Severity::Fail | Severity::Error) {
            if let Some(detail) = outcome.details.summary_line() {
                self.write_line(&format!("#   line {}: {}", outcome.position, detail));
            }
        }
    }

    pub fn warning(&mut self, warning: &Warning) {
        self.write_line(&format!("# WARNING {warning}"));
    }

    /// Abort the stream; no footer follows
    pub fn bail_out(mut self, reason: &str) {
        self.write_bail_out(reason);
        self.closed = true;
    }

    /// Write the per-severity footer and close the stream
    pub fn close(mut self, verdict: Severity) {
        let counts: Vec<String> = Severity::OUTCOMES
            .iter()
            .map(|s| format!("{}={}", s, self.counts.get(s).copied().unwrap_or(0)))
            .collect();
        self.write_line(&format!("# Summary: {}", counts.join(" ")));
        self.write_line(&format!("# Result: {verdict}"));
        self.flush();
        self.closed = true;
    }

    fn write_bail_out(&mut self, reason: &str) {
        self.write_line(&format!("Bail out! {reason}"));
        self.flush();
    }

    fn write_line(&mut self, line: &str) {
        for (name, writer) in &mut self.writers {
            if let Err(e) = writeln!(writer, "{line}") {
                warn!("Failed to write TAP to {}: {}", name, e);
            }
        }
    }

    fn flush(&mut self) {
        for (name, writer) in &mut self.writers {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush TAP to {}: {}", name, e);
            }
        }
    }
}

impl Drop for TapSink {
    fn drop(&mut self) {
        if !self.closed {
            self.write_bail_out("Internal error");
        }
    }
}

/// Render one TAP test line
pub fn test_line(number: usize, outcome: &ScriptOutcome) -> String {
    let ok = matches!(
        outcome.severity,
        Severity::Success | Severity::Skip | Severity::Warning
    );
    let status = if ok { "ok" } else { "not ok" };

    let directive = match outcome.severity {
        Severity::Skip => Some(format!(
            "SKIP {}",
            outcome.skip_reason.as_deref().unwrap_or("")
        )),
        Severity::Fail | Severity::Error if outcome.unstable && !outcome.is_failed_skip() => {
            Some("TODO unstable".to_string())
        }
        _ => None,
    };

    match directive {
        Some(d) => format!("{status} {number} - {} # {}", outcome.display, d.trim_end()),
        None => format!("{status} {number} - {}", outcome.display),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn script(name: &str) -> PathBuf {
        PathBuf::from("/s").join(name)
    }

    #[test]
    fn test_lines() {
        let ok = ScriptOutcome::success(&script("a.lux"), "a.lux");
        assert_eq!(test_line(1, &ok), "ok 1 - a.lux");

        let skipped = ScriptOutcome::skip(&script("b.lux"), "b.lux", "0", "SKIP as X is set");
        assert_eq!(test_line(2, &skipped), "ok 2 - b.lux # SKIP SKIP as X is set");

        let failed_skip =
            ScriptOutcome::skip(&script("c.lux"), "c.lux", "0", "FAIL: setup missing").unstable(true);
        assert_eq!(test_line(3, &failed_skip), "not ok 3 - c.lux");

        let unstable = ScriptOutcome::with_severity(Severity::Fail, &script("d.lux"), "d.lux")
            .unstable(true);
        assert_eq!(test_line(4, &unstable), "not ok 4 - d.lux # TODO unstable");
    }

    #[test]
    fn test_stream() {
        let dir = tempdir().unwrap();
        let mut sink = TapSink::open(dir.path(), &[]).unwrap();
        sink.plan(2);
        sink.preamble(&TapPreamble {
            user_at_host: "ci@box".to_string(),
            cwd: PathBuf::from("/work"),
            invocation: vec!["suite-runner".to_string(), "run".to_string()],
            report: PathBuf::from("/logs/summary.log.html"),
        });
        sink.test(&ScriptOutcome::success(&script("a.lux"), "a.lux"));
        sink.warning(&Warning::new(&script("b.lux"), "3", "unused"));
        sink.test(&ScriptOutcome::error(&script("b.lux"), "b.lux", "3", "no match"));
        sink.close(Severity::Error);

        let tap = std::fs::read_to_string(dir.path().join(TAP_LOG)).unwrap();
        let lines: Vec<&str> = tap.lines().collect();
        assert_eq!(lines[0], "1..2");
        assert_eq!(lines[1], "# Suite started by ci@box");
        assert!(lines.contains(&"ok 1 - a.lux"));
        assert!(lines.contains(&"not ok 2 - b.lux"));
        assert!(lines.contains(&"#   line 3: no match"));
        assert!(lines.contains(&"# WARNING /s/b.lux:3: unused"));
        assert!(lines.contains(&"# Summary: success=1 skip=0 warning=0 fail=0 error=1"));
        assert!(!tap.contains("Bail out!"));
    }

    #[test]
    fn test_bail_out_on_timeout() {
        let dir = tempdir().unwrap();
        let mut sink = TapSink::open(dir.path(), &[]).unwrap();
        sink.plan(3);
        sink.test(&ScriptOutcome::success(&script("a.lux"), "a.lux"));
        sink.bail_out("Suite timeout");

        let tap = std::fs::read_to_string(dir.path().join(TAP_LOG)).unwrap();
        assert!(tap.ends_with("ok 1 - a.lux\nBail out! Suite timeout\n"));
    }

    #[test]
    fn test_drop_bails_out() {
        let dir = tempdir().unwrap();
        {
            let mut sink = TapSink::open(dir.path(), &[]).unwrap();
            sink.plan(3);
        }
        let tap = std::fs::read_to_string(dir.path().join(TAP_LOG)).unwrap();
        assert!(tap.ends_with("Bail out! Internal error\n"));
    }
}
