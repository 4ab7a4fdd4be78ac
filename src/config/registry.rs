//! Configuration key registry
//!
//! Every configuration key has a merge policy and a value domain. Keys that
//! are not listed here are rejected wherever they are written or read.

use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{Progress, RunMode};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Bad value for {key}: {value:?} ({reason})")]
    BadValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Duplicate registry entry: {0}")]
    Duplicate(&'static str),
}

/// How repeated writes of a key combine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Last write wins
    Single,
    /// Every write accumulates
    StdList,
    /// First write in a pass clears earlier values, later writes accumulate
    ResetList,
}

impl KeyKind {
    pub fn is_list(self) -> bool {
        !matches!(self, KeyKind::Single)
    }
}

/// Accepted values for a key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDomain {
    Text,
    Path,
    Integer { min: i64 },
    IntOrInfinity,
    Bool,
    Choice(&'static [&'static str]),
    Threshold,
    Pattern,
    Assignment,
}

/// Registry entry
#[derive(Clone, Copy, Debug)]
pub struct KeySpec {
    pub name: &'static str,
    pub kind: KeyKind,
    pub domain: ValueDomain,
}

const fn key(name: &'static str, kind: KeyKind, domain: ValueDomain) -> KeySpec {
    KeySpec { name, kind, domain }
}

const THRESHOLDS: &[&str] = &[
    "enable", "success", "skip", "warning", "fail", "error", "disable",
];

/// All known configuration keys
pub const REGISTRY: &[KeySpec] = &[
    key("mode", KeyKind::Single, ValueDomain::Choice(RunMode::NAMES)),
    key("log_dir", KeyKind::Single, ValueDomain::Path),
    key("log_root", KeyKind::Single, ValueDomain::Path),
    key("config_dir", KeyKind::Single, ValueDomain::Path),
    key("config_name", KeyKind::Single, ValueDomain::Text),
    key("file_pattern", KeyKind::Single, ValueDomain::Pattern),
    key("case_prefix", KeyKind::Single, ValueDomain::Text),
    key("rerun", KeyKind::Single, ValueDomain::Threshold),
    key("html", KeyKind::Single, ValueDomain::Threshold),
    key("junit", KeyKind::Single, ValueDomain::Bool),
    key("tap", KeyKind::StdList, ValueDomain::Text),
    key("progress", KeyKind::Single, ValueDomain::Choice(Progress::NAMES)),
    key("suite_timeout", KeyKind::Single, ValueDomain::IntOrInfinity),
    key("case_timeout", KeyKind::Single, ValueDomain::IntOrInfinity),
    key("multiplier", KeyKind::Single, ValueDomain::Integer { min: 1 }),
    key("doc_depth", KeyKind::Single, ValueDomain::IntOrInfinity),
    key("interpreter", KeyKind::Single, ValueDomain::Text),
    key("interpreter_args", KeyKind::ResetList, ValueDomain::Text),
    key("var", KeyKind::StdList, ValueDomain::Assignment),
    key("skip", KeyKind::StdList, ValueDomain::Text),
    key("skip_unless", KeyKind::StdList, ValueDomain::Text),
    key("require", KeyKind::StdList, ValueDomain::Text),
    key("unstable", KeyKind::Single, ValueDomain::Bool),
];

/// Look up a key in the registry
pub fn lookup(name: &str) -> Result<&'static KeySpec, ConfigError> {
    REGISTRY
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| ConfigError::UnknownKey(name.to_string()))
}

/// Check the registry for duplicate entries
pub fn validate_registry() -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for spec in REGISTRY {
        if !seen.insert(spec.name) {
            return Err(ConfigError::Duplicate(spec.name));
        }
    }
    Ok(())
}

impl KeySpec {
    /// Check a raw value against the key's domain
    pub fn validate(&self, value: &str) -> Result<(), ConfigError> {
        let bad = |reason: &str| ConfigError::BadValue {
            key: self.name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self.domain {
            ValueDomain::Text | ValueDomain::Path => Ok(()),
            ValueDomain::Integer { min } => match value.parse::<i64>() {
                Ok(n) if n >= min => Ok(()),
                Ok(_) => Err(bad(&format!("must be at least {min}"))),
                Err(_) => Err(bad("not an integer")),
            },
            ValueDomain::IntOrInfinity => parse_limit(value)
                .map(|_| ())
                .ok_or_else(|| bad("expected a non-negative integer or infinity")),
            ValueDomain::Bool => parse_bool(value)
                .map(|_| ())
                .ok_or_else(|| bad("expected true or false")),
            ValueDomain::Choice(choices) => {
                if choices.contains(&value) {
                    Ok(())
                } else {
                    Err(bad(&format!("expected one of {}", choices.join(", "))))
                }
            }
            ValueDomain::Threshold => {
                if THRESHOLDS.contains(&value) {
                    Ok(())
                } else {
                    Err(bad(&format!("expected one of {}", THRESHOLDS.join(", "))))
                }
            }
            ValueDomain::Pattern => regex::Regex::new(value)
                .map(|_| ())
                .map_err(|e| bad(&e.to_string())),
            ValueDomain::Assignment => match value.split_once('=') {
                Some((name, _)) if !name.is_empty() => Ok(()),
                _ => Err(bad("expected NAME=VALUE")),
            },
        }
    }
}

/// Parse a limit; `None` inside means infinity
pub fn parse_limit(value: &str) -> Option<Option<u64>> {
    if value == "infinity" {
        Some(None)
    } else {
        value.parse::<u64>().ok().map(Some)
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
