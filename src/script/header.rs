//! Header-directive script parser
//!
//! Understands only what the run loop needs from a script:
//!
//! - `[doc text]` and `[docN text]` documentation at level 1 or N, up to
//!   `MAX_DOC_LEVEL`
//! - `[config key=value]` per-script options
//! - `[include path]` nested files, relative to the including file
//!
//! The `skip`, `skip_unless` and `require` options are evaluated against
//! `var` assignments and the process environment once the whole script has
//! been read. Every other non-blank line is kept as an opaque command.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ParseOutcome, ParsedScript, ScriptCommand, ScriptParser};
use crate::config::{lookup, ArgDict, MergePass, Opts};
use crate::models::{position_of, DocLine, FilePos, Warning, MAX_DOC_LEVEL};

const MAX_INCLUDE_DEPTH: usize = 16;
const CONDITIONS: [&str; 3] = ["skip", "skip_unless", "require"];

#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderParser;

impl HeaderParser {
    pub fn new() -> Self {
        Self
    }
}

struct Failure {
    stack: Vec<FilePos>,
    message: String,
}

#[derive(Default)]
struct Collected {
    commands: Vec<ScriptCommand>,
    config: Vec<(String, String, Vec<FilePos>)>,
    warnings: Vec<Warning>,
}

impl ScriptParser for HeaderParser {
    fn parse(&self, script: &Path, opts: &Opts) -> ParseOutcome {
        let mut collected = Collected::default();
        let mut stack = Vec::new();
        if let Err(failure) = read_file(script, script, &mut stack, &mut collected) {
            return ParseOutcome::Error {
                stack: failure.stack,
                message: failure.message,
            };
        }

        let mut pass = MergePass::new();
        let mut file_dict = ArgDict::new();
        for (key, value, stack) in &collected.config {
            file_dict = match pass.merge_value(key, value, file_dict) {
                Ok(dict) => dict,
                Err(e) => {
                    return ParseOutcome::Error {
                        stack: stack.clone(),
                        message: e.to_string(),
                    }
                }
            };
        }

        if let Some((reason, stack)) = check_conditions(opts, &collected.config) {
            debug!("{}: {}", script.display(), reason);
            return ParseOutcome::Skip { reason, stack };
        }

        let file_opts = match file_dict.to_opts() {
            Ok(opts) => opts,
            Err(e) => {
                return ParseOutcome::Error {
                    stack: Vec::new(),
                    message: e.to_string(),
                }
            }
        };

        ParseOutcome::Parsed(ParsedScript {
            commands: collected.commands,
            opts: file_opts,
            warnings: collected.warnings,
        })
    }
}

fn read_file(
    script: &Path,
    file: &Path,
    stack: &mut Vec<FilePos>,
    collected: &mut Collected,
) -> Result<(), Failure> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        let mut stack = stack.clone();
        stack.push(FilePos::new(file, 0));
        Failure {
            stack,
            message: format!("Failed to read {}: {}", file.display(), e),
        }
    })?;

    for (index, line) in content.lines().enumerate() {
        let lineno = index + 1;
        let here = |stack: &[FilePos]| {
            let mut stack = stack.to_vec();
            stack.push(FilePos::new(file, lineno));
            stack
        };
        let fail = |stack: &[FilePos], message: String| Failure {
            stack: here(stack),
            message,
        };

        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let directive = match text.strip_prefix('[') {
            Some(rest) => match rest.strip_suffix(']') {
                Some(inner) => inner.trim(),
                None => return Err(fail(stack.as_slice(), format!("Unterminated directive: {text}"))),
            },
            None => {
                collected.commands.push(command(file, lineno, text, None));
                continue;
            }
        };

        let (word, arg) = match directive.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, arg.trim()),
            None => (directive, ""),
        };

        if let Some(level) = doc_level(word) {
            if level > MAX_DOC_LEVEL {
                collected.warnings.push(Warning::new(
                    script,
                    position_of(&here(stack.as_slice())),
                    format!("Documentation level {level} exceeds {MAX_DOC_LEVEL}"),
                ));
                continue;
            }
            let doc = DocLine {
                level,
                text: arg.to_string(),
            };
            collected.commands.push(command(file, lineno, text, Some(doc)));
        } else if word == "config" {
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| fail(stack.as_slice(), format!("Malformed config directive: {text}")))?;
            let key = key.trim();
            if lookup(key).is_err() {
                collected.warnings.push(Warning::new(
                    script,
                    position_of(&here(stack.as_slice())),
                    format!("Unknown config key: {key}"),
                ));
                continue;
            }
            collected
                .config
                .push((key.to_string(), value.trim().to_string(), here(stack.as_slice())));
        } else if word == "include" {
            if arg.is_empty() {
                return Err(fail(stack.as_slice(), "Missing include path".to_string()));
            }
            if stack.len() >= MAX_INCLUDE_DEPTH {
                return Err(fail(stack.as_slice(), format!("Include nesting too deep at {arg}")));
            }
            let included = resolve_include(file, arg);
            stack.push(FilePos::new(file, lineno));
            let result = read_file(script, &included, stack, collected);
            stack.pop();
            result?;
        } else {
            collected.commands.push(command(file, lineno, text, None));
        }
    }

    Ok(())
}

fn command(file: &Path, lineno: usize, text: &str, doc: Option<DocLine>) -> ScriptCommand {
    ScriptCommand {
        file: file.to_path_buf(),
        lineno,
        text: text.to_string(),
        doc,
    }
}

/// `doc` is level 1, `docN` is level N
fn doc_level(word: &str) -> Option<u32> {
    let suffix = word.strip_prefix("doc")?;
    if suffix.is_empty() {
        Some(1)
    } else {
        suffix.parse().ok().filter(|level| *level > 0)
    }
}

fn resolve_include(file: &Path, arg: &str) -> PathBuf {
    let path = Path::new(arg);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match file.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

/// Evaluate skip conditions from the effective options and the script's
/// own config directives
fn check_conditions(
    opts: &Opts,
    declared: &[(String, String, Vec<FilePos>)],
) -> Option<(String, Vec<FilePos>)> {
    let from_opts = opts
        .iter()
        .filter(|(key, _)| CONDITIONS.contains(&key.as_str()))
        .map(|(key, value)| (key.as_str(), value.as_str(), Vec::new()));
    let from_script = declared
        .iter()
        .filter(|(key, _, _)| CONDITIONS.contains(&key.as_str()))
        .map(|(key, value, stack)| (key.as_str(), value.as_str(), stack.clone()));

    for (key, condition, stack) in from_opts.chain(from_script) {
        let set = is_set(condition, opts, declared);
        let name = condition.split('=').next().unwrap_or(condition);
        let reason = match (key, set) {
            ("skip", true) => format!("SKIP as variable {name} is set"),
            ("skip_unless", false) => format!("SKIP as variable {name} is not set"),
            ("require", false) => format!("FAIL as required variable {name} is not set"),
            _ => continue,
        };
        return Some((reason, stack));
    }
    None
}

/// `NAME` is set when defined; `NAME=VALUE` when defined with that value
fn is_set(condition: &str, opts: &Opts, declared: &[(String, String, Vec<FilePos>)]) -> bool {
    let (name, expected) = match condition.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (condition, None),
    };

    let assigned = declared
        .iter()
        .filter(|(key, _, _)| key == "var")
        .map(|(_, value, _)| value.as_str())
        .chain(
            opts.iter()
                .filter(|(key, _)| key == "var")
                .map(|(_, value)| value.as_str()),
        )
        .filter_map(|assignment| assignment.split_once('='))
        .find(|(var, _)| *var == name)
        .map(|(_, value)| value.to_string());

    let value = assigned.or_else(|| std::env::var(name).ok());
    match (value, expected) {
        (Some(value), Some(expected)) => value == expected,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
