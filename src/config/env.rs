//! Environment variable configuration
//!
//! The environment only decorates diagnostics and supplies a fallback
//! configuration directory; it never overrides explicit settings.

use std::env;
use std::path::PathBuf;

/// Environment variable prefix
const ENV_PREFIX: &str = "SUITE_RUNNER";

/// Settings read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Login name from USER or USERNAME
    pub user: Option<String>,
    /// Host name of this machine
    pub host: Option<String>,
    /// Config directory from SUITE_RUNNER_CONFIG_DIR
    pub config_dir: Option<PathBuf>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            user: env::var("USER")
                .or_else(|_| env::var("USERNAME"))
                .ok()
                .filter(|u| !u.is_empty()),
            host: hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned()),
            config_dir: get_env("CONFIG_DIR").map(PathBuf::from),
        }
    }

    /// `user@host` for diagnostics; the user part is empty when unknown
    pub fn user_at_host(&self) -> String {
        let host = self.host.as_deref().unwrap_or("localhost");
        match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => format!("@{host}"),
        }
    }

    /// Host name with fallback
    pub fn host_or(&self, default: &str) -> String {
        self.host.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl EnvGuard {
    /// Set variables (or remove them when the value is `None`) until the
    /// guard is dropped
    pub fn set(vars: &[(&str, Option<&str>)]) -> Self {
        let previous = vars
            .iter()
            .map(|(k, _)| (k.to_string(), env::var(k).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        Self { previous }
    }
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_at_host() {
        let config = EnvConfig {
            user: Some("tester".to_string()),
            host: Some("box".to_string()),
            config_dir: None,
        };
        assert_eq!(config.user_at_host(), "tester@box");

        let anonymous = EnvConfig {
            user: None,
            ..config
        };
        assert_eq!(anonymous.user_at_host(), "@box");
    }

    #[test]
    fn test_env_load() {
        let _guard = EnvGuard::set(&[
            ("USER", Some("ci")),
            ("SUITE_RUNNER_CONFIG_DIR", Some("/etc/suite")),
        ]);

        let config = EnvConfig::load();
        assert_eq!(config.user.as_deref(), Some("ci"));
        assert_eq!(config.config_dir, Some(PathBuf::from("/etc/suite")));
    }
}
