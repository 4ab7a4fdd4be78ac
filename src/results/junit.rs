//! JUnit XML export
//!
//! Converts a finished summary log into `junit.xml`, one `<testsuite>` per
//! input group and one `<testcase>` per recorded script.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::html::escape;
use super::summary::{read_summary, CaseGroup, PriorSummary};
use super::JUNIT_FILE;
use crate::models::{ScriptOutcome, Severity};

/// Render the summary log at `summary_path` into `<run_dir>/junit.xml`
pub fn write_junit(summary_path: &Path, run_dir: &Path) -> Result<PathBuf> {
    let prior = read_summary(summary_path)
        .with_context(|| format!("Failed to load {}", summary_path.display()))?;
    let target = run_dir.join(JUNIT_FILE);
    std::fs::write(&target, format_junit(&prior))
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!("Wrote JUnit report {}", target.display());
    Ok(target)
}

pub fn format_junit(prior: &PriorSummary) -> String {
    let mut output = String::new();
    output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    output.push_str(&format!(
        "<testsuites name=\"{}\" timestamp=\"{}\">\n",
        escape(&prior.header.log_dir.display().to_string()),
        prior.header.started_at.to_rfc3339()
    ));
    for group in &prior.groups {
        format_group(&mut output, group);
    }
    output.push_str("</testsuites>\n");
    output
}

fn format_group(output: &mut String, group: &CaseGroup) {
    let count = |severity: Severity| group.cases.iter().filter(|c| c.severity == severity).count();
    let time: u64 = group.cases.iter().map(|c| c.duration_ms).sum();
    let name = escape(&group.input.display().to_string());

    output.push_str(&format!(
        "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{}\">\n",
        name,
        group.cases.len(),
        count(Severity::Fail),
        count(Severity::Error),
        count(Severity::Skip),
        seconds(time)
    ));
    for case in &group.cases {
        format_case(output, &name, case);
    }
    output.push_str("  </testsuite>\n");
}

fn format_case(output: &mut String, classname: &str, case: &ScriptOutcome) {
    output.push_str(&format!(
        "    <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
        escape(&case.display),
        classname,
        seconds(case.duration_ms)
    ));

    let message = escape(&case.details.summary_line().unwrap_or_default());
    let child = match case.severity {
        Severity::Fail => Some(format!(
            "      <failure message=\"{}\" type=\"fail\">Line {}: {}</failure>\n",
            message, case.position, message
        )),
        Severity::Error => Some(format!(
            "      <error message=\"{}\" type=\"error\">Line {}: {}</error>\n",
            message, case.position, message
        )),
        Severity::Skip => Some(format!("      <skipped message=\"{message}\"/>\n")),
        _ => None,
    };

    match child {
        Some(child) => {
            output.push_str(">\n");
            output.push_str(&child);
            output.push_str("    </testcase>\n");
        }
        None => output.push_str("/>\n"),
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}
