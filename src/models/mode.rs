//! Run modes and progress verbosity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the run loop does with each parsed script
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    List,
    ListDir,
    Doc,
    Validate,
    Execute,
}

impl RunMode {
    pub const NAMES: &'static [&'static str] = &["list", "list_dir", "doc", "validate", "execute"];

    pub fn name(&self) -> &'static str {
        match self {
            RunMode::List => "list",
            RunMode::ListDir => "list_dir",
            RunMode::Doc => "doc",
            RunMode::Validate => "validate",
            RunMode::Execute => "execute",
        }
    }

    /// Modes that only enumerate scripts and never produce reports
    pub fn is_enumeration(&self) -> bool {
        matches!(self, RunMode::List | RunMode::ListDir | RunMode::Doc)
    }

    /// Modes that persist a summary log and feed the TAP sink
    pub fn is_reporting(&self) -> bool {
        matches!(self, RunMode::Validate | RunMode::Execute)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(RunMode::List),
            "list_dir" => Ok(RunMode::ListDir),
            "doc" => Ok(RunMode::Doc),
            "validate" => Ok(RunMode::Validate),
            "execute" => Ok(RunMode::Execute),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Console verbosity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progress {
    Silent,
    Summary,
    Brief,
    Verbose,
}

impl Progress {
    pub const NAMES: &'static [&'static str] = &["silent", "summary", "brief", "verbose"];
}

impl FromStr for Progress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" => Ok(Progress::Silent),
            "summary" => Ok(Progress::Summary),
            "brief" => Ok(Progress::Brief),
            "verbose" => Ok(Progress::Verbose),
            other => Err(format!("unknown progress level: {other}")),
        }
    }
}
