//! Configuration file management
//!
//! Handles the built-in default configuration and site configuration files.

use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::args::{ArgDict, MergePass};
use super::registry::ConfigError;

/// Extension of site configuration files
pub const CONFIG_EXT: &str = "yaml";

/// Built-in defaults, applied as the lowest-precedence layer
pub const DEFAULT_CONFIG: &str = r#"
mode: execute
log_root: suite_logs
config_dir: conf
file_pattern: '^[^.].*\.lux$'
case_prefix: ""
rerun: disable
html: success
junit: false
progress: brief
suite_timeout: infinity
case_timeout: 300
multiplier: 1000
doc_depth: infinity
interpreter: ""
unstable: false
"#;

/// Key/value pairs read from one configuration document
#[derive(Clone, Debug, Default)]
pub struct ConfigFile {
    pub path: Option<PathBuf>,
    pub pairs: Vec<(String, String)>,
}

impl ConfigFile {
    /// The built-in default configuration
    pub fn builtin() -> Result<Self, ConfigError> {
        let pairs = parse_document(DEFAULT_CONFIG, Path::new("<builtin>"))?;
        Ok(Self { path: None, pairs })
    }

    /// Find a named configuration file in a directory
    pub fn find(config_dir: &Path, name: &str) -> Option<PathBuf> {
        [CONFIG_EXT, "yml"]
            .iter()
            .map(|ext| config_dir.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let pairs = parse_document(&content, path)?;
        debug!("Loaded {} settings from {}", pairs.len(), path.display());

        Ok(Self {
            path: Some(path.to_path_buf()),
            pairs,
        })
    }

    /// Load a named file when it exists, otherwise an empty configuration
    pub fn load_named(config_dir: &Path, name: &str) -> Result<Self, ConfigError> {
        match Self::find(config_dir, name) {
            Some(path) => Self::load(path),
            None => {
                debug!(
                    "No configuration {} in {}, using defaults",
                    name,
                    config_dir.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Merge the pairs into a fresh dictionary
    pub fn into_dict(self) -> Result<ArgDict, ConfigError> {
        MergePass::new().merge_all(self.pairs, ArgDict::new())
    }
}

/// Parse a YAML mapping of key to scalar or list of scalars
fn parse_document(content: &str, path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let doc: Value = serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    let mapping = match doc {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(parse_err("expected a mapping of settings".to_string())),
    };

    let mut pairs = Vec::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key)
            .ok_or_else(|| parse_err("setting names must be scalars".to_string()))?;
        match value {
            Value::Sequence(items) => {
                for item in items {
                    let item = scalar_to_string(&item)
                        .ok_or_else(|| parse_err(format!("{key}: list items must be scalars")))?;
                    pairs.push((key.clone(), item));
                }
            }
            Value::Null => {}
            other => {
                let value = scalar_to_string(&other)
                    .ok_or_else(|| parse_err(format!("{key}: expected a scalar or a list")))?;
                pairs.push((key, value));
            }
        }
    }
    Ok(pairs)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_defaults() {
        let dict = ConfigFile::builtin().unwrap().into_dict().unwrap();
        assert_eq!(dict.get("mode").unwrap(), &["execute"]);
        assert_eq!(dict.get("rerun").unwrap(), &["disable"]);
        assert_eq!(dict.get("junit").unwrap(), &["false"]);
        assert_eq!(dict.get("multiplier").unwrap(), &["1000"]);
    }

    #[test]
    fn test_load_named_with_lists() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("ci.yaml"),
            "progress: silent\nvar:\n  - A=1\n  - B=2\nsuite_timeout: 600\n",
        )
        .unwrap();

        let config = ConfigFile::load_named(dir.path(), "ci").unwrap();
        assert!(config.path.is_some());
        let dict = config.into_dict().unwrap();
        assert_eq!(dict.get("var").unwrap(), &["A=1", "B=2"]);
        assert_eq!(dict.get("suite_timeout").unwrap(), &["600"]);
    }

    #[test]
    fn test_missing_named_file_is_empty() {
        let dir = tempdir().unwrap();
        let config = ConfigFile::load_named(dir.path(), "nohost").unwrap();
        assert!(config.path.is_none());
        assert!(config.pairs.is_empty());
    }

    #[test]
    fn test_unknown_key_in_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "no_such_setting: 1\n").unwrap();

        let result = ConfigFile::load(&path).unwrap().into_dict();
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "- just\n- a list\n").unwrap();
        assert!(matches!(
            ConfigFile::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./conf");
        assert_eq!(path, PathBuf::from("./conf"));
    }
}
