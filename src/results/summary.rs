//! Summary log persistence
//!
//! The summary log is a JSON-lines file: a suite header, one record per
//! processed script and a closing record with the verdict. It is appended
//! while the suite runs so an interrupted run still leaves a readable log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::{CONFIG_LOG, SUMMARY_LOG};
use crate::config::ArgLayers;
use crate::models::{RunMode, ScriptOutcome, Severity};

/// Summary log read errors
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: malformed record: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{}: missing suite header", .0.display())]
    MissingHeader(PathBuf),
}

/// First record of a summary log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuiteHeader {
    pub started_at: DateTime<Utc>,
    pub mode: RunMode,
    pub root: PathBuf,
    pub case_prefix: String,
    pub log_dir: PathBuf,
    #[serde(default)]
    pub invocation: Vec<String>,
    pub tool_version: String,
}

/// Last record of a completed summary log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuiteFooter {
    pub completed_at: DateTime<Utc>,
    pub verdict: Severity,
    #[serde(default)]
    pub timed_out: bool,
}

/// Outcome record tagged with the input it was expanded from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub group: PathBuf,
    pub outcome: ScriptOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum SummaryRecord {
    Suite(SuiteHeader),
    Case(CaseRecord),
    End(SuiteFooter),
}

/// Append-only summary log of a running suite.
///
/// The file is released exactly once: by `close`, or by `Drop` when the run
/// ends abnormally.
pub struct SummaryLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl SummaryLog {
    /// Create the summary log in a run directory and write its header
    pub fn create(log_dir: &Path, header: SuiteHeader) -> io::Result<Self> {
        let path = log_dir.join(SUMMARY_LOG);
        let file = File::create(&path)?;
        let mut log = Self {
            path,
            writer: Some(BufWriter::new(file)),
        };
        log.write_record(&SummaryRecord::Suite(header))?;
        log.flush()?;
        debug!("Opened summary log {}", log.path.display());
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one outcome
    pub fn append(&mut self, group: &Path, outcome: &ScriptOutcome) -> io::Result<()> {
        self.write_record(&SummaryRecord::Case(CaseRecord {
            group: group.to_path_buf(),
            outcome: outcome.clone(),
        }))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Write the closing record and release the file
    pub fn close(mut self, footer: SuiteFooter) -> io::Result<PathBuf> {
        self.write_record(&SummaryRecord::End(footer))?;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(self.path.clone())
    }

    fn write_record(&mut self, record: &SummaryRecord) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "summary log already closed"))?;
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")
    }
}

impl Drop for SummaryLog {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            warn!(
                "Summary log {} released without a closing record",
                self.path.display()
            );
            let _ = writer.flush();
        }
    }
}

/// Cases expanded from one input
#[derive(Clone, Debug, PartialEq)]
pub struct CaseGroup {
    pub input: PathBuf,
    pub cases: Vec<ScriptOutcome>,
}

/// A summary log read back from disk
#[derive(Clone, Debug, PartialEq)]
pub struct PriorSummary {
    pub path: PathBuf,
    pub header: SuiteHeader,
    pub groups: Vec<CaseGroup>,
    pub footer: Option<SuiteFooter>,
}

impl PriorSummary {
    /// All outcomes in recorded order
    pub fn outcomes(&self) -> impl Iterator<Item = &ScriptOutcome> {
        self.groups.iter().flat_map(|g| g.cases.iter())
    }

    /// Strip the case prefix from a recorded display path and resolve it
    /// against the recorded suite root
    pub fn script_path(&self, outcome: &ScriptOutcome) -> PathBuf {
        let relative = outcome
            .display
            .strip_prefix(&self.header.case_prefix)
            .unwrap_or(&outcome.display);
        self.header.root.join(relative)
    }
}

/// Summary log path for a run directory or a summary log file
pub fn locate(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(SUMMARY_LOG)
    } else {
        path.to_path_buf()
    }
}

/// Read a summary log; a missing closing record is tolerated
pub fn read_summary(path: &Path) -> Result<PriorSummary, SummaryError> {
    let file = File::open(path).map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut header = None;
    let mut groups: Vec<CaseGroup> = Vec::new();
    let mut footer = None;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| SummaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record: SummaryRecord =
            serde_json::from_str(&line).map_err(|e| SummaryError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                message: e.to_string(),
            })?;

        match record {
            SummaryRecord::Suite(h) => header = Some(h),
            SummaryRecord::Case(case) => {
                let same_group = groups.last().is_some_and(|g| g.input == case.group);
                match groups.last_mut() {
                    Some(group) if same_group => group.cases.push(case.outcome),
                    _ => {
                        let group = CaseGroup {
                            input: case.group,
                            cases: vec![case.outcome],
                        };
                        groups.push(group);
                    }
                }
            }
            SummaryRecord::End(f) => footer = Some(f),
        }
    }

    let header = header.ok_or_else(|| SummaryError::MissingHeader(path.to_path_buf()))?;
    Ok(PriorSummary {
        path: path.to_path_buf(),
        header,
        groups,
        footer,
    })
}

#[derive(Serialize)]
struct ConfigLog<'a> {
    invocation: &'a [String],
    layers: &'a ArgLayers,
}

/// Dump the argument layers next to the summary log
pub fn write_config_log(
    log_dir: &Path,
    layers: &ArgLayers,
    invocation: &[String],
) -> io::Result<PathBuf> {
    let path = log_dir.join(CONFIG_LOG);
    let content = serde_json::to_string_pretty(&ConfigLog { invocation, layers })?;
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn header(log_dir: &Path, root: &Path, prefix: &str) -> SuiteHeader {
        SuiteHeader {
            started_at: Utc::now(),
            mode: RunMode::Execute,
            root: root.to_path_buf(),
            case_prefix: prefix.to_string(),
            log_dir: log_dir.to_path_buf(),
            invocation: vec!["suite-runner".to_string()],
            tool_version: "test".to_string(),
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let mut log = SummaryLog::create(dir.path(), header(dir.path(), Path::new("/s"), "")).unwrap();

        let a = ScriptOutcome::success(Path::new("/s/a.lux"), "a.lux");
        let b = ScriptOutcome::error(Path::new("/s/d/b.lux"), "d/b.lux", "3", "boom");
        let c = ScriptOutcome::success(Path::new("/s/d/c.lux"), "d/c.lux");
        log.append(Path::new("a.lux"), &a).unwrap();
        log.append(Path::new("d"), &b).unwrap();
        log.append(Path::new("d"), &c).unwrap();
        let path = log
            .close(SuiteFooter {
                completed_at: Utc::now(),
                verdict: Severity::Error,
                timed_out: false,
            })
            .unwrap();

        let prior = read_summary(&path).unwrap();
        assert_eq!(prior.groups.len(), 2);
        assert_eq!(prior.groups[1].cases.len(), 2);
        assert_eq!(prior.outcomes().count(), 3);
        assert_eq!(prior.footer.unwrap().verdict, Severity::Error);
    }

    #[test]
    fn test_interrupted_log_is_readable() {
        let dir = tempdir().unwrap();
        {
            let mut log =
                SummaryLog::create(dir.path(), header(dir.path(), Path::new("/s"), "")).unwrap();
            log.append(
                Path::new("a.lux"),
                &ScriptOutcome::success(Path::new("/s/a.lux"), "a.lux"),
            )
            .unwrap();
            // dropped without close
        }

        let prior = read_summary(&dir.path().join(SUMMARY_LOG)).unwrap();
        assert!(prior.footer.is_none());
        assert_eq!(prior.outcomes().count(), 1);
    }

    #[test]
    fn test_script_path_strips_prefix() {
        let dir = tempdir().unwrap();
        let prior = PriorSummary {
            path: dir.path().join(SUMMARY_LOG),
            header: header(dir.path(), Path::new("/suite"), "lux/"),
            groups: Vec::new(),
            footer: None,
        };
        let outcome = ScriptOutcome::success(Path::new("/moved/x.lux"), "lux/sub/x.lux");
        assert_eq!(prior.script_path(&outcome), PathBuf::from("/suite/sub/x.lux"));
    }

    #[test]
    fn test_malformed_and_headerless() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SUMMARY_LOG);

        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(
            read_summary(&path),
            Err(SummaryError::Malformed { line: 1, .. })
        ));

        std::fs::write(&path, "").unwrap();
        let err = read_summary(&path).unwrap_err();
        assert!(matches!(err, SummaryError::MissingHeader(_)));
        assert_eq!(err.to_string(), format!("{}: missing suite header", path.display()));
    }

    #[test]
    fn test_config_log() {
        let dir = tempdir().unwrap();
        let path = write_config_log(dir.path(), &ArgLayers::default(), &["x".to_string()]).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\"internal\""));
    }
}
