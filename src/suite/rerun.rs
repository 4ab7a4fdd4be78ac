//! Rerun resolution
//!
//! Rebuilds the outcomes of earlier runs from their summary logs and picks
//! the scripts whose recorded severity reaches the rerun threshold.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::executor::RunError;
use crate::models::Severity;
use crate::results::{locate, read_summary};

/// A script and the severity it was recorded with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedOutcome {
    pub script: PathBuf,
    pub severity: Severity,
}

/// Summary logs to read: explicit inputs, else the previous run directory
pub fn prior_logs(inputs: &[PathBuf], prev_log_dir: Option<&Path>) -> Result<Vec<PathBuf>, RunError> {
    if !inputs.is_empty() {
        return Ok(inputs.iter().map(|p| locate(p)).collect());
    }
    match prev_log_dir {
        Some(dir) => Ok(vec![locate(dir)]),
        None => Err(RunError::NoInput),
    }
}

/// Read and flatten the outcomes recorded in summary logs
pub fn collect(logs: &[PathBuf]) -> Result<Vec<RecordedOutcome>, RunError> {
    let mut recorded = Vec::new();
    for log in logs {
        let prior = read_summary(log).map_err(|e| RunError::File {
            path: log.clone(),
            message: e.to_string(),
        })?;
        debug!(
            "{}: {} recorded outcomes",
            log.display(),
            prior.outcomes().count()
        );
        recorded.extend(prior.outcomes().map(|outcome| RecordedOutcome {
            script: prior.script_path(outcome),
            severity: outcome.severity,
        }));
    }
    Ok(recorded)
}

/// Scripts recorded with at least `min` severity, sorted and deduplicated
pub fn filter(outcomes: &[RecordedOutcome], min: Severity) -> Vec<PathBuf> {
    outcomes
        .iter()
        .filter(|o| o.severity.meets(min))
        .map(|o| o.script.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Resolve the scripts to rerun
pub fn resolve(
    inputs: &[PathBuf],
    prev_log_dir: Option<&Path>,
    threshold: Severity,
) -> Result<Vec<PathBuf>, RunError> {
    let logs = prior_logs(inputs, prev_log_dir)?;
    let recorded = collect(&logs)?;
    let scripts = filter(&recorded, threshold);
    info!(
        "Rerunning {} of {} scripts with severity {} or worse",
        scripts.len(),
        recorded.len(),
        threshold
    );
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunMode, ScriptOutcome};
    use crate::results::{SuiteFooter, SuiteHeader, SummaryLog};
    use chrono::Utc;
    use tempfile::tempdir;

    fn recorded(script: &str, severity: Severity) -> RecordedOutcome {
        RecordedOutcome {
            script: PathBuf::from(script),
            severity,
        }
    }

    fn write_prior_run(log_dir: &Path, prefix: &str, cases: &[(&str, Severity)]) {
        let header = SuiteHeader {
            started_at: Utc::now(),
            mode: RunMode::Execute,
            root: PathBuf::from("/suite"),
            case_prefix: prefix.to_string(),
            log_dir: log_dir.to_path_buf(),
            invocation: Vec::new(),
            tool_version: "test".to_string(),
        };
        let mut log = SummaryLog::create(log_dir, header).unwrap();
        for (name, severity) in cases {
            let outcome = ScriptOutcome::with_severity(
                *severity,
                &Path::new("/suite").join(name),
                &format!("{prefix}{name}"),
            );
            log.append(Path::new("/suite"), &outcome).unwrap();
        }
        log.close(SuiteFooter {
            completed_at: Utc::now(),
            verdict: Severity::Error,
            timed_out: false,
        })
        .unwrap();
    }

    #[test]
    fn test_rerun_failures_and_errors() {
        let dir = tempdir().unwrap();
        write_prior_run(
            dir.path(),
            "",
            &[
                ("A.lux", Severity::Success),
                ("B.lux", Severity::Fail),
                ("C.lux", Severity::Error),
            ],
        );

        let scripts = resolve(&[], Some(dir.path()), Severity::Fail).unwrap();
        assert_eq!(
            scripts,
            vec![PathBuf::from("/suite/B.lux"), PathBuf::from("/suite/C.lux")]
        );
    }

    #[test]
    fn test_explicit_logs_with_prefix() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_prior_run(first.path(), "lux/", &[("x.lux", Severity::Warning)]);
        write_prior_run(
            second.path(),
            "lux/",
            &[("x.lux", Severity::Fail), ("y.lux", Severity::Skip)],
        );

        let inputs = vec![first.path().to_path_buf(), second.path().join("summary.log")];
        let scripts = resolve(&inputs, None, Severity::Warning).unwrap();
        assert_eq!(scripts, vec![PathBuf::from("/suite/x.lux")]);
    }

    #[test]
    fn test_no_input() {
        assert!(matches!(
            resolve(&[], None, Severity::Fail),
            Err(RunError::NoInput)
        ));
    }

    #[test]
    fn test_missing_log_is_file_error() {
        let dir = tempdir().unwrap();
        let result = resolve(&[], Some(&dir.path().join("gone")), Severity::Fail);
        assert!(matches!(result, Err(RunError::File { .. })));
    }

    #[test]
    fn test_filter_is_monotonic() {
        let outcomes = vec![
            recorded("/s/a", Severity::Success),
            recorded("/s/b", Severity::Skip),
            recorded("/s/c", Severity::Warning),
            recorded("/s/d", Severity::Fail),
            recorded("/s/e", Severity::Error),
            recorded("/s/d", Severity::Fail),
        ];

        let thresholds = [
            Severity::Enable,
            Severity::Success,
            Severity::Skip,
            Severity::Warning,
            Severity::Fail,
            Severity::Error,
            Severity::Disable,
        ];
        let mut previous: Option<Vec<PathBuf>> = None;
        for threshold in thresholds {
            let selected = filter(&outcomes, threshold);
            for script in &selected {
                let o = outcomes.iter().find(|o| &o.script == script).unwrap();
                assert!(o.severity >= threshold);
            }
            if let Some(prev) = &previous {
                assert!(selected.iter().all(|s| prev.contains(s)));
            }
            previous = Some(selected);
        }

        assert_eq!(filter(&outcomes, Severity::Enable).len(), 5);
        assert!(filter(&outcomes, Severity::Disable).is_empty());
    }
}
