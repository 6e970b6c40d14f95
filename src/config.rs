//! Process configuration read from the environment once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::converter::BackendChoice;
use crate::preferences::PreferencesStore;

pub const ENV_BACKEND: &str = "MARKITDOWN_UI_BACKEND";
pub const ENV_BIN: &str = "MARKITDOWN_UI_BIN";
pub const ENV_TIMEOUT: &str = "MARKITDOWN_UI_TIMEOUT_SECS";
pub const ENV_PREFERENCES: &str = "MARKITDOWN_UI_PREFERENCES";

pub const DEFAULT_PROGRAM: &str = "markitdown";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: BackendChoice,
    pub program: PathBuf,
    /// `None` disables the external-program timeout.
    pub timeout: Option<Duration>,
    pub preferences_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            program: PathBuf::from(DEFAULT_PROGRAM),
            timeout: Some(DEFAULT_TIMEOUT),
            preferences_path: PreferencesStore::default_path(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Invalid values are logged and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_BACKEND) {
            match raw.parse() {
                Ok(backend) => config.backend = backend,
                Err(e) => tracing::warn!("{ENV_BACKEND}: {e}"),
            }
        }
        if let Some(program) = lookup(ENV_BIN).filter(|p| !p.trim().is_empty()) {
            config.program = PathBuf::from(program);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.timeout = None,
                Ok(secs) => config.timeout = Some(Duration::from_secs(secs)),
                Err(e) => tracing::warn!(value = %raw, "{ENV_TIMEOUT}: {e}"),
            }
        }
        if let Some(path) = lookup(ENV_PREFERENCES).filter(|p| !p.trim().is_empty()) {
            config.preferences_path = PathBuf::from(path);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = from(&[]);
        assert_eq!(config.backend, BackendChoice::Auto);
        assert_eq!(config.program, PathBuf::from("markitdown"));
        assert_eq!(config.timeout, Some(Duration::from_secs(300)));
        assert!(config.preferences_path.ends_with("markitdown_ui/preferences.json"));
    }

    #[test]
    fn overrides_apply() {
        let config = from(&[
            (ENV_BACKEND, "builtin"),
            (ENV_BIN, "/opt/md/bin/markitdown"),
            (ENV_TIMEOUT, "0"),
            (ENV_PREFERENCES, "/tmp/p.json"),
        ]);
        assert_eq!(config.backend, BackendChoice::Builtin);
        assert_eq!(config.program, PathBuf::from("/opt/md/bin/markitdown"));
        assert_eq!(config.timeout, None);
        assert_eq!(config.preferences_path, PathBuf::from("/tmp/p.json"));
    }

    #[test]
    fn junk_values_keep_defaults() {
        let config = from(&[(ENV_BACKEND, "pandoc"), (ENV_TIMEOUT, "soon")]);
        assert_eq!(config.backend, BackendChoice::Auto);
        assert_eq!(config.timeout, Some(DEFAULT_TIMEOUT));
    }
}
