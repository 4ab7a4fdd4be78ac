//! Console output for a running suite
//!
//! Per-case progress lines, listings, documentation and the final summary.
//! Operational logging goes through `tracing` instead.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use tracing::warn;

use crate::models::{DocLine, Progress, ScriptOutcome, Severity, MAX_DOC_LEVEL};

/// Console writer with a verbosity level
pub struct Console {
    out: Box<dyn Write + Send>,
    progress: Progress,
    colorize: bool,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>, progress: Progress) -> Self {
        Self {
            out,
            progress,
            colorize: false,
        }
    }

    /// Console on stdout, colored when attached to a terminal
    pub fn stdout(progress: Progress) -> Self {
        let colorize = io::stdout().is_terminal();
        Self {
            colorize,
            ..Self::new(Box::new(io::stdout()), progress)
        }
    }

    pub fn set_progress(&mut self, progress: Progress) {
        self.progress = progress;
    }

    /// Progress line for one finished case
    pub fn case_result(&mut self, seq: usize, total: usize, width: usize, outcome: &ScriptOutcome) {
        if self.progress < Progress::Brief {
            return;
        }
        let line = case_line(seq, total, width, outcome, self.colorize);
        self.emit(&line);

        if self.progress == Progress::Verbose {
            if let Some(detail) = outcome.details.summary_line() {
                self.emit(&format!("    line {}: {}", outcome.position, detail));
            }
            for warning in &outcome.warnings {
                self.emit(&format!("    warning: {warning}"));
            }
        }
    }

    /// Listing produced by the list modes, one entry per line
    pub fn listing(&mut self, entries: &BTreeSet<String>) {
        for entry in entries {
            self.emit(entry);
        }
    }

    pub fn doc(&mut self, lines: &[String]) {
        for line in lines {
            self.emit(line);
        }
    }

    /// Diagnostic for a script that could not be enumerated
    pub fn diagnostic(&mut self, display: &str, position: &str, message: &str) {
        if self.progress > Progress::Silent {
            self.emit(&format!("{display}:{position}: {message}"));
        }
    }

    /// Per-severity totals and the verdict
    pub fn summary(&mut self, outcomes: &[ScriptOutcome], verdict: Severity, timed_out: bool) {
        if self.progress < Progress::Summary {
            return;
        }
        let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
        for outcome in outcomes {
            *counts.entry(outcome.severity).or_default() += 1;
        }

        self.emit("");
        for severity in Severity::OUTCOMES {
            let count = counts.get(&severity).copied().unwrap_or(0);
            if count > 0 {
                self.emit(&format!("{:8} {}", format!("{severity}:"), count));
            }
        }
        let verdict = paint(verdict, verdict.name(), self.colorize);
        if timed_out {
            self.emit(&format!("Result: {verdict} (suite timeout)"));
        } else {
            self.emit(&format!("Result: {verdict}"));
        }
    }

    /// Local reference to a rendered report
    pub fn report_ref(&mut self, path: &Path) {
        if self.progress > Progress::Silent {
            self.emit(&format!("file://{}", path.display()));
        }
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            warn!("Failed to write console output: {}", e);
        }
    }
}

/// Display path padded to `width`, then the right-aligned sequence number
/// and the severity
pub fn case_line(
    seq: usize,
    total: usize,
    width: usize,
    outcome: &ScriptOutcome,
    colorize: bool,
) -> String {
    let digits = total.to_string().len();
    let severity = paint(outcome.severity, outcome.severity.name(), colorize);
    format!(
        "{:<width$} [{:>digits$}/{}] {} {}",
        outcome.display,
        seq,
        total,
        outcome.severity.symbol(),
        severity,
        width = width,
        digits = digits
    )
}

/// Documentation of one script, indented by level
pub fn doc_lines(display: &str, docs: &[DocLine], max_depth: Option<u64>) -> Vec<String> {
    let depth = match max_depth {
        Some(0) => 1,
        Some(depth) => depth,
        None => u64::MAX,
    };
    let selected: Vec<&DocLine> = docs.iter().filter(|d| u64::from(d.level) <= depth).collect();
    if selected.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![format!("{display}:")];
    lines.extend(
        selected
            .iter()
            .map(|d| format!("{}{}", "  ".repeat(d.level.min(MAX_DOC_LEVEL) as usize), d.text)),
    );
    lines
}

fn paint(severity: Severity, text: &str, colorize: bool) -> String {
    if !colorize {
        return text.to_string();
    }
    let code = match severity {
        Severity::Success => "32",
        Severity::Skip | Severity::Warning => "33",
        Severity::Fail | Severity::Error => "31",
        Severity::Enable | Severity::Disable => return text.to_string(),
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

#[cfg(test)]
pub use shared::SharedBuffer;

#[cfg(test)]
mod shared {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// Cloneable in-memory writer for capturing console output
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(level: u32, text: &str) -> DocLine {
        DocLine {
            level,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_case_line_alignment() {
        let outcome = ScriptOutcome::success(Path::new("/s/a.lux"), "a.lux");
        assert_eq!(case_line(3, 12, 8, &outcome, false), "a.lux    [ 3/12] ✓ success");
    }

    #[test]
    fn test_doc_lines_depth() {
        let docs = vec![doc(1, "Top"), doc(2, "Nested"), doc(3, "Deep")];
        assert_eq!(
            doc_lines("a.lux", &docs, Some(0)),
            vec!["a.lux:".to_string(), "  Top".to_string()]
        );
        assert_eq!(doc_lines("a.lux", &docs, Some(2)).len(), 3);
        assert_eq!(doc_lines("a.lux", &docs, None).len(), 4);
        assert!(doc_lines("a.lux", &[], None).is_empty());
    }

    #[test]
    fn test_doc_indent_is_bounded() {
        let lines = doc_lines("a.lux", &[doc(u32::MAX, "Deep")], None);
        assert_eq!(lines[1], format!("{}Deep", "  ".repeat(MAX_DOC_LEVEL as usize)));
    }

    #[test]
    fn test_progress_levels() {
        let buffer = SharedBuffer::default();
        let mut console = Console::new(Box::new(buffer.clone()), Progress::Summary);
        let outcome = ScriptOutcome::error(Path::new("/s/a.lux"), "a.lux", "2", "boom");

        console.case_result(1, 1, 5, &outcome);
        assert!(buffer.contents().is_empty());

        console.summary(&[outcome.clone()], Severity::Error, false);
        assert!(buffer.contents().contains("error:   1"));
        assert!(buffer.contents().contains("Result: error"));

        let buffer = SharedBuffer::default();
        let mut console = Console::new(Box::new(buffer.clone()), Progress::Verbose);
        console.case_result(1, 1, 5, &outcome);
        assert!(buffer.contents().contains("    line 2: boom"));
    }

    #[test]
    fn test_silent_hides_report_ref() {
        let buffer = SharedBuffer::default();
        let mut console = Console::new(Box::new(buffer.clone()), Progress::Silent);
        console.report_ref(Path::new("/logs/summary.log.html"));
        console.summary(&[], Severity::Warning, false);
        assert!(buffer.contents().is_empty());
    }
}
