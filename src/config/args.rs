//! Layered argument dictionaries
//!
//! Configuration values live in five dictionaries. Lookups scan them in
//! precedence order (internal, user, file, config, default) and the first
//! dictionary holding a key wins.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::registry::{self, parse_bool, parse_limit, ConfigError, KeyKind};

/// Flat key/value pairs exchanged with the script parser
pub type Opts = Vec<(String, String)>;

/// Ordered mapping of key to the values written for it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgDict {
    entries: Vec<(String, Vec<String>)>,
}

impl ArgDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn set(mut self, key: &str, values: Vec<String>) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = values,
            None => self.entries.push((key.to_string(), values)),
        }
        self
    }

    fn take(&mut self, key: &str) -> Vec<String> {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => std::mem::take(&mut entry.1),
            None => Vec::new(),
        }
    }

    /// Convert to flat pairs.
    ///
    /// List keys keep one pair per value, single keys keep their last value
    /// and keys without values are dropped.
    pub fn to_opts(&self) -> Result<Opts, ConfigError> {
        let mut opts = Vec::new();
        for (key, values) in &self.entries {
            let spec = registry::lookup(key)?;
            if spec.kind.is_list() {
                opts.extend(values.iter().map(|v| (key.clone(), v.clone())));
            } else if let Some(last) = values.last() {
                opts.push((key.clone(), last.clone()));
            }
        }
        Ok(opts)
    }

    /// Group flat pairs by key, keeping every value in order
    pub fn from_opts(opts: &[(String, String)]) -> Result<Self, ConfigError> {
        let mut dict = ArgDict::new();
        for (key, value) in opts {
            registry::lookup(key)?;
            let mut values = dict.take(key);
            values.push(value.clone());
            dict = dict.set(key, values);
        }
        Ok(dict)
    }
}

/// The five argument layers, highest precedence first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Internal,
    User,
    File,
    Config,
    Default,
}

impl Layer {
    pub const PRECEDENCE: [Layer; 5] = [
        Layer::Internal,
        Layer::User,
        Layer::File,
        Layer::Config,
        Layer::Default,
    ];
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Internal => "internal",
            Layer::User => "user",
            Layer::File => "file",
            Layer::Config => "config",
            Layer::Default => "default",
        };
        f.write_str(name)
    }
}

/// Tracks which keys were written during one resolution pass
#[derive(Debug, Default)]
pub struct MergePass {
    updated: HashSet<String>,
}

impl MergePass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one value into a dictionary according to the key's policy
    pub fn merge_value(
        &mut self,
        key: &str,
        value: &str,
        dict: ArgDict,
    ) -> Result<ArgDict, ConfigError> {
        let spec = registry::lookup(key)?;
        spec.validate(value)?;

        let first_in_pass = self.updated.insert(key.to_string());
        let mut dict = dict;
        let mut values = dict.take(key);

        match spec.kind {
            KeyKind::Single => values = vec![value.to_string()],
            KeyKind::StdList => values.push(value.to_string()),
            KeyKind::ResetList => {
                if first_in_pass {
                    values.clear();
                }
                values.push(value.to_string());
            }
        }

        Ok(dict.set(key, values))
    }

    /// Write a sequence of pairs in order
    pub fn merge_all<I, K, V>(&mut self, pairs: I, dict: ArgDict) -> Result<ArgDict, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs.into_iter().try_fold(dict, |dict, (k, v)| {
            self.merge_value(k.as_ref(), v.as_ref(), dict)
        })
    }
}

/// All five layers
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgLayers {
    pub internal: ArgDict,
    pub user: ArgDict,
    pub file: ArgDict,
    pub config: ArgDict,
    pub default: ArgDict,
}

impl ArgLayers {
    pub fn layer(&self, layer: Layer) -> &ArgDict {
        match layer {
            Layer::Internal => &self.internal,
            Layer::User => &self.user,
            Layer::File => &self.file,
            Layer::Config => &self.config,
            Layer::Default => &self.default,
        }
    }

    /// Replace one layer, returning the updated set
    pub fn with_layer(mut self, layer: Layer, dict: ArgDict) -> Self {
        match layer {
            Layer::Internal => self.internal = dict,
            Layer::User => self.user = dict,
            Layer::File => self.file = dict,
            Layer::Config => self.config = dict,
            Layer::Default => self.default = dict,
        }
        self
    }

    /// Values of the first layer holding the key
    pub fn pick_val(&self, key: &str) -> Result<Option<(Layer, &[String])>, ConfigError> {
        registry::lookup(key)?;
        Ok(Layer::PRECEDENCE
            .iter()
            .find_map(|&layer| self.layer(layer).get(key).map(|v| (layer, v))))
    }

    /// Resolve a single-valued key
    pub fn resolve(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self
            .pick_val(key)?
            .and_then(|(_, values)| values.last().cloned())
            .unwrap_or_else(|| default.to_string()))
    }

    /// Resolve a list-valued key
    pub fn resolve_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self
            .pick_val(key)?
            .map(|(_, values)| values.to_vec())
            .unwrap_or_default())
    }

    /// Resolve and parse a single-valued key
    pub fn resolve_parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.pick_val(key)?.and_then(|(_, v)| v.last()) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::BadValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// Resolve an integer-or-infinity key; `None` means infinity
    pub fn resolve_limit(&self, key: &str, default: Option<u64>) -> Result<Option<u64>, ConfigError> {
        match self.pick_val(key)?.and_then(|(_, v)| v.last()) {
            Some(raw) => parse_limit(raw).ok_or_else(|| ConfigError::BadValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: "expected a non-negative integer or infinity".to_string(),
            }),
            None => Ok(default),
        }
    }

    pub fn resolve_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.pick_val(key)?.and_then(|(_, v)| v.last()) {
            Some(raw) => parse_bool(raw).ok_or_else(|| ConfigError::BadValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: "expected true or false".to_string(),
            }),
            None => Ok(default),
        }
    }

    /// Collapse the layers into one dictionary, each key taken from the
    /// first layer that holds it
    pub fn effective(&self) -> ArgDict {
        let mut merged = ArgDict::new();
        for layer in Layer::PRECEDENCE {
            for (key, values) in self.layer(layer).iter() {
                if !merged.contains(key) {
                    merged = merged.set(key, values.to_vec());
                }
            }
        }
        merged
    }

    /// Effective configuration in flat form
    pub fn effective_opts(&self) -> Result<Opts, ConfigError> {
        self.effective().to_opts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&str, &str)]) -> ArgDict {
        MergePass::new().merge_all(pairs.iter().copied(), ArgDict::new()).unwrap()
    }

    #[test]
    fn test_internal_layer_wins() {
        let layers = ArgLayers {
            internal: dict(&[("log_dir", "/internal")]),
            user: dict(&[("log_dir", "/user")]),
            file: dict(&[("log_dir", "/file")]),
            config: dict(&[("log_dir", "/config")]),
            default: dict(&[("log_dir", "/default")]),
        };
        assert_eq!(layers.resolve("log_dir", "x").unwrap(), "/internal");

        let (layer, _) = layers.pick_val("log_dir").unwrap().unwrap();
        assert_eq!(layer, Layer::Internal);
    }

    #[test]
    fn test_precedence_falls_through() {
        let layers = ArgLayers {
            config: dict(&[("progress", "verbose")]),
            default: dict(&[("progress", "brief"), ("mode", "execute")]),
            ..Default::default()
        };
        assert_eq!(layers.resolve("progress", "silent").unwrap(), "verbose");
        assert_eq!(layers.resolve("mode", "list").unwrap(), "execute");
        assert_eq!(layers.resolve("case_prefix", "none").unwrap(), "none");
    }

    #[test]
    fn test_unknown_key() {
        let layers = ArgLayers::default();
        assert!(matches!(
            layers.resolve("bogus", ""),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(MergePass::new()
            .merge_value("bogus", "1", ArgDict::new())
            .is_err());
    }

    #[test]
    fn test_single_replaces() {
        let d = dict(&[("progress", "brief"), ("progress", "silent")]);
        assert_eq!(d.get("progress").unwrap(), &["silent".to_string()]);
    }

    #[test]
    fn test_std_list_accumulates() {
        let d = dict(&[("var", "A=1"), ("var", "B=2"), ("var", "C=3")]);
        assert_eq!(d.get("var").unwrap(), &["A=1", "B=2", "C=3"]);
    }

    #[test]
    fn test_reset_list() {
        let d = dict(&[("interpreter_args", "-a"), ("interpreter_args", "-b")]);
        assert_eq!(d.get("interpreter_args").unwrap(), &["-a", "-b"]);

        // A fresh pass clears what earlier passes wrote
        let d = MergePass::new()
            .merge_value("interpreter_args", "-c", d)
            .unwrap();
        assert_eq!(d.get("interpreter_args").unwrap(), &["-c"]);
    }

    #[test]
    fn test_std_list_survives_passes() {
        let d = dict(&[("tap", "stdout")]);
        let d = MergePass::new().merge_value("tap", "out.tap", d).unwrap();
        assert_eq!(d.get("tap").unwrap(), &["stdout", "out.tap"]);
    }

    #[test]
    fn test_bad_value_rejected() {
        let err = MergePass::new()
            .merge_value("mode", "sideways", ArgDict::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { .. }));
    }

    #[test]
    fn test_opts_conversion() {
        let d = dict(&[("var", "A=1"), ("var", "B=2"), ("mode", "doc")]);
        let opts = d.to_opts().unwrap();
        assert_eq!(
            opts,
            vec![
                ("var".to_string(), "A=1".to_string()),
                ("var".to_string(), "B=2".to_string()),
                ("mode".to_string(), "doc".to_string()),
            ]
        );
        assert_eq!(ArgDict::from_opts(&opts).unwrap(), d);
    }

    #[test]
    fn test_opts_single_takes_last() {
        let opts = vec![
            ("progress".to_string(), "brief".to_string()),
            ("progress".to_string(), "silent".to_string()),
        ];
        let grouped = ArgDict::from_opts(&opts).unwrap();
        assert_eq!(grouped.get("progress").unwrap().len(), 2);
        assert_eq!(
            grouped.to_opts().unwrap(),
            vec![("progress".to_string(), "silent".to_string())]
        );
    }

    #[test]
    fn test_opts_drop_empty() {
        let d = ArgDict::new().set("tap", Vec::new()).set("html", Vec::new());
        assert!(d.to_opts().unwrap().is_empty());
    }

    #[test]
    fn test_effective_and_typed() {
        let layers = ArgLayers {
            user: dict(&[("suite_timeout", "infinity"), ("junit", "yes")]),
            default: dict(&[("suite_timeout", "60"), ("case_timeout", "300")]),
            ..Default::default()
        };
        assert_eq!(layers.resolve_limit("suite_timeout", Some(1)).unwrap(), None);
        assert_eq!(layers.resolve_limit("case_timeout", None).unwrap(), Some(300));
        assert!(layers.resolve_bool("junit", false).unwrap());

        let effective = layers.effective();
        assert_eq!(effective.get("suite_timeout").unwrap(), &["infinity"]);
        assert_eq!(effective.get("case_timeout").unwrap(), &["300"]);
    }
}
