//! HTML annotation of run logs
//!
//! Renders the summary log and per-case event logs as static HTML pages.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::summary::{read_summary, PriorSummary};
use super::{CONFIG_LOG, HTML_EXT, SNAPSHOT_HTML, SUMMARY_LOG};
use crate::executor::RunError;
use crate::models::Severity;
use crate::output::Console;

const STYLE: &str = r#"
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; background: #f5f5f5; }
        .container { max-width: 1200px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        h1 { color: #333; border-bottom: 2px solid #007bff; padding-bottom: 10px; }
        table { width: 100%; border-collapse: collapse; margin: 20px 0; }
        th, td { padding: 8px 12px; text-align: left; border-bottom: 1px solid #ddd; }
        th { background: #007bff; color: white; }
        pre { background: #f8f9fa; padding: 16px; overflow-x: auto; }
        .success { color: #28a745; font-weight: bold; }
        .skip { color: #6c757d; font-weight: bold; }
        .warning { color: #e0a800; font-weight: bold; }
        .fail, .error { color: #dc3545; font-weight: bold; }
"#;

/// Render a summary log as an HTML page
pub fn render_summary(prior: &PriorSummary) -> String {
    let header = &prior.header;
    let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
    for outcome in prior.outcomes() {
        *counts.entry(outcome.severity).or_default() += 1;
    }

    let verdict = match &prior.footer {
        Some(footer) if footer.timed_out => format!("{} (suite timeout)", footer.verdict),
        Some(footer) => footer.verdict.to_string(),
        None => "running".to_string(),
    };

    let mut output = page_start(&format!("Suite Report - {}", header.log_dir.display()));
    output.push_str(&format!(
        "        <h1>Suite Report</h1>\n        <p>Started: {}<br>Mode: {}<br>Verdict: <span class=\"{}\">{}</span></p>\n",
        format_datetime(&header.started_at),
        header.mode,
        verdict.split(' ').next().unwrap_or(""),
        escape(&verdict)
    ));

    let totals: Vec<String> = Severity::OUTCOMES
        .iter()
        .map(|s| format!("{}: {}", s, counts.get(s).copied().unwrap_or(0)))
        .collect();
    output.push_str(&format!("        <p>{}</p>\n", totals.join(" | ")));

    output.push_str(
        "        <table>\n            <tr><th>#</th><th>Script</th><th>Result</th><th>Line</th><th>Details</th></tr>\n",
    );
    for (index, outcome) in prior.outcomes().enumerate() {
        let script = match &outcome.event_log {
            Some(log) => format!(
                "<a href=\"{}\">{}</a>",
                escape(&relative_link(&html_path(log), &header.log_dir)),
                escape(&outcome.display)
            ),
            None => escape(&outcome.display),
        };
        output.push_str(&format!(
            "            <tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td></tr>\n",
            index + 1,
            script,
            outcome.severity,
            outcome.severity,
            escape(&outcome.position),
            escape(&outcome.details.summary_line().unwrap_or_default())
        ));
    }
    output.push_str("        </table>\n");
    output.push_str(&page_end());
    output
}

/// Render an event log as an HTML page.
///
/// `suite_dir` is the run directory the log belongs to; the page title is
/// relative to it and links back to the run's summary and config logs when
/// they exist.
pub fn render_event_log(path: &Path, suite_dir: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    let name = relative_link(path, suite_dir);
    let up = link_prefix(&parent_dir(path), suite_dir);

    let mut links = Vec::new();
    if suite_dir.join(SUMMARY_LOG).is_file() {
        links.push(format!(
            "<a href=\"{}\">Suite summary</a>",
            escape(&format!("{up}{SUMMARY_LOG}{HTML_EXT}"))
        ));
    }
    if suite_dir.join(CONFIG_LOG).is_file() {
        links.push(format!(
            "<a href=\"{}\">Configuration</a>",
            escape(&format!("{up}{CONFIG_LOG}"))
        ));
    }

    let mut output = page_start(&format!("Event Log - {name}"));
    output.push_str(&format!("        <h1>{}</h1>\n", escape(&name)));
    if !links.is_empty() {
        output.push_str(&format!("        <p>{}</p>\n", links.join(" | ")));
    }
    output.push_str(&format!("        <pre>{}</pre>\n", escape(&content)));
    output.push_str(&page_end());
    Ok(output)
}

/// Render the summary so far into a temporary file and atomically replace
/// the published snapshot
pub fn publish_snapshot(summary_path: &Path) -> Result<PathBuf> {
    let prior = read_summary(summary_path)?;
    let dir = parent_dir(summary_path);
    let target = dir.join(SNAPSHOT_HTML);
    write_atomic(&target, &render_summary(&prior))?;
    debug!("Published snapshot {}", target.display());
    Ok(target)
}

/// Render the final summary page and the event log pages it links to
pub fn publish_final(summary_path: &Path) -> Result<PathBuf> {
    let prior = read_summary(summary_path)?;
    let dir = parent_dir(summary_path);

    for outcome in prior.outcomes() {
        if let Some(log) = &outcome.event_log {
            if log.is_file() {
                write_atomic(&html_path(log), &render_event_log(log, &dir)?)?;
            }
        }
    }

    let target = html_path(summary_path);
    write_atomic(&target, &render_summary(&prior))?;

    let snapshot = dir.join(SNAPSHOT_HTML);
    if snapshot.exists() {
        std::fs::remove_file(&snapshot)
            .with_context(|| format!("Failed to remove {}", snapshot.display()))?;
    }

    info!("Wrote report {}", target.display());
    Ok(target)
}

/// Annotate a summary log or an event log.
///
/// The run directory is found by walking up to the nearest config log. A
/// summary log is rendered with that directory's final report rules when
/// `recursive` is set, otherwise only its own page. Any other log is
/// rendered as an event log of that run. The page reference goes to the
/// console unless it is silent.
pub fn annotate(recursive: bool, log_file: &Path, console: &mut Console) -> Result<PathBuf, RunError> {
    let file_error = |e: anyhow::Error| RunError::File {
        path: log_file.to_path_buf(),
        message: format!("{e:#}"),
    };

    if !log_file.is_file() {
        return Err(RunError::File {
            path: log_file.to_path_buf(),
            message: "no such log file".to_string(),
        });
    }

    let suite_dir = find_suite_dir(log_file);
    debug!("Annotating {} in suite {}", log_file.display(), suite_dir.display());

    let is_summary = log_file.file_name().is_some_and(|n| n == SUMMARY_LOG);
    let page = if is_summary && recursive {
        publish_final(log_file).map_err(file_error)?
    } else if is_summary {
        let prior = read_summary(log_file).map_err(|e| file_error(e.into()))?;
        let target = html_path(log_file);
        write_atomic(&target, &render_summary(&prior)).map_err(file_error)?;
        target
    } else {
        let target = html_path(log_file);
        let page = render_event_log(log_file, &suite_dir).map_err(file_error)?;
        write_atomic(&target, &page).map_err(file_error)?;
        target
    };

    console.report_ref(&page);
    Ok(page)
}

/// Walk up from a log file to the directory holding the config log,
/// defaulting to the log file's own directory
pub fn find_suite_dir(log_file: &Path) -> PathBuf {
    let own_dir = parent_dir(log_file);
    let mut dir = Some(own_dir.as_path());
    while let Some(current) = dir {
        if current.join(CONFIG_LOG).is_file() {
            return current.to_path_buf();
        }
        dir = current.parent();
    }
    own_dir
}

/// HTML page path for a log file
pub fn html_path(log: &Path) -> PathBuf {
    let mut name = log.as_os_str().to_owned();
    name.push(HTML_EXT);
    PathBuf::from(name)
}

fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let dir = parent_dir(target);
    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .context("Failed to write temporary report")?;
    tmp.persist(target)
        .with_context(|| format!("Failed to publish {}", target.display()))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `../` steps leading from `from` up to `base`
fn link_prefix(from: &Path, base: &Path) -> String {
    match from.strip_prefix(base) {
        Ok(rel) => "../".repeat(rel.components().count()),
        Err(_) => format!("{}/", base.display()),
    }
}

fn relative_link(target: &Path, base: &Path) -> String {
    target
        .strip_prefix(base)
        .unwrap_or(target)
        .display()
        .to_string()
}

fn page_start(title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    <title>{}</title>\n    <style>{}    </style>\n</head>\n<body>\n    <div class=\"container\">\n",
        escape(title),
        STYLE
    )
}

fn page_end() -> String {
    "    </div>\n</body>\n</html>\n".to_string()
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
