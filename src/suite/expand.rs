//! Suite expansion
//!
//! Turns input paths into the ordered list of scripts to process.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One script of the suite
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteEntry {
    /// Absolute script path
    pub path: PathBuf,
    /// Case prefix followed by the path relative to the suite root
    pub display: String,
    /// Input argument this entry was expanded from
    pub input: PathBuf,
    /// Set when the input could not be read
    pub error: Option<String>,
}

/// Result of expanding the inputs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    pub entries: Vec<SuiteEntry>,
    /// Longest display path
    pub max_width: usize,
    /// Common ancestor of every script
    pub root: PathBuf,
}

impl Expansion {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Expand files and directories into an ordered, deduplicated script list.
///
/// Directories are searched recursively for regular files whose name
/// matches `pattern`. Inputs that cannot be read become error entries.
pub fn expand(inputs: &[PathBuf], pattern: &Regex, case_prefix: &str) -> Expansion {
    let mut found: Vec<(PathBuf, PathBuf, Option<String>)> = Vec::new();

    for input in inputs {
        let abs = absolute(input);
        match std::fs::metadata(&abs) {
            Ok(meta) if meta.is_dir() => {
                let mut scripts = collect_dir(&abs, pattern);
                scripts.sort();
                debug!("{}: {} scripts", abs.display(), scripts.len());
                found.extend(scripts.into_iter().map(|p| (p, input.clone(), None)));
            }
            Ok(_) => found.push((abs, input.clone(), None)),
            Err(e) => {
                warn!("Cannot access {}: {}", input.display(), e);
                found.push((abs, input.clone(), Some(e.to_string())));
            }
        }
    }

    let mut seen = HashSet::new();
    found.retain(|(path, _, _)| seen.insert(path.clone()));

    let root = common_root(found.iter().map(|(p, _, _)| p.as_path()));
    let entries: Vec<SuiteEntry> = found
        .into_iter()
        .map(|(path, input, error)| SuiteEntry {
            display: display_path(&path, &root, case_prefix),
            path,
            input,
            error,
        })
        .collect();
    let max_width = entries
        .iter()
        .map(|e| e.display.chars().count())
        .max()
        .unwrap_or(0);

    Expansion {
        entries,
        max_width,
        root,
    }
}

fn collect_dir(dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Make a path absolute and drop `.` components
pub fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Deepest directory containing every path
pub fn common_root<'a, I>(paths: I) -> PathBuf
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut root: Option<PathBuf> = None;
    for path in paths {
        let dir = path.parent().unwrap_or(path);
        root = Some(match root {
            None => dir.to_path_buf(),
            Some(current) => current
                .components()
                .zip(dir.components())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    root.unwrap_or_default()
}

/// Case prefix plus the path relative to the root
pub fn display_path(path: &Path, root: &Path, case_prefix: &str) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    format!("{case_prefix}{}", relative.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn lux_pattern() -> Regex {
        Regex::new(r"^[^.].*\.lux$").unwrap()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("suite/b")).unwrap();
        fs::create_dir_all(dir.path().join("suite/a")).unwrap();
        for file in [
            "suite/b/two.lux",
            "suite/a/one.lux",
            "suite/a/zero.lux",
            "suite/a/notes.txt",
            "suite/a/.hidden.lux",
            "suite/top.lux",
        ] {
            fs::write(dir.path().join(file), "[doc x]\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_expand_directory_sorted() {
        let dir = fixture();
        let expansion = expand(&[dir.path().join("suite")], &lux_pattern(), "");

        let names: Vec<_> = expansion.entries.iter().map(|e| e.display.as_str()).collect();
        assert_eq!(names, vec!["a/one.lux", "a/zero.lux", "b/two.lux", "top.lux"]);
        assert_eq!(expansion.max_width, "a/zero.lux".len());
        assert!(expansion.entries.iter().all(|e| e.error.is_none()));
    }

    #[test]
    fn test_expand_is_deterministic() {
        let dir = fixture();
        let inputs = vec![dir.path().join("suite")];
        assert_eq!(
            expand(&inputs, &lux_pattern(), ""),
            expand(&inputs, &lux_pattern(), "")
        );
    }

    #[test]
    fn test_expand_dedup_and_prefix() {
        let dir = fixture();
        let file = dir.path().join("suite/a/one.lux");
        let expansion = expand(
            &[file.clone(), dir.path().join("suite/a"), file],
            &lux_pattern(),
            "lux/",
        );

        let names: Vec<_> = expansion.entries.iter().map(|e| e.display.as_str()).collect();
        assert_eq!(names, vec!["lux/one.lux", "lux/zero.lux"]);
        assert_eq!(expansion.max_width, "lux/zero.lux".len());
    }

    #[test]
    fn test_explicit_file_ignores_pattern() {
        let dir = fixture();
        let expansion = expand(&[dir.path().join("suite/a/notes.txt")], &lux_pattern(), "");
        assert_eq!(expansion.len(), 1);
        assert_eq!(expansion.entries[0].display, "notes.txt");
    }

    #[test]
    fn test_missing_input_placeholder() {
        let dir = fixture();
        let missing = dir.path().join("suite/missing.lux");
        let expansion = expand(
            &[dir.path().join("suite/top.lux"), missing.clone()],
            &lux_pattern(),
            "",
        );

        assert_eq!(expansion.len(), 2);
        assert_eq!(expansion.entries[1].path, missing);
        assert!(expansion.entries[1].error.is_some());
    }

    #[test]
    fn test_common_root() {
        let root = common_root([Path::new("/a/b/c.lux"), Path::new("/a/d/e.lux")]);
        assert_eq!(root, PathBuf::from("/a"));
        assert_eq!(common_root(std::iter::empty::<&Path>()), PathBuf::new());
    }

    #[test]
    fn test_absolute_drops_cur_dir() {
        let path = absolute(Path::new("/x/./y.lux"));
        assert_eq!(path, PathBuf::from("/x/y.lux"));
    }
}
