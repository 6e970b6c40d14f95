//! The one place that owns a manager of each kind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::config::AppConfig;
use crate::console_capture::ConsoleCapture;
use crate::converter::{ConverterManager, DefaultConverterFactory};
use crate::notifications::NotificationManager;
use crate::preferences::PreferencesStore;
use crate::style::ThemeManager;

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("application context already installed")]
    AlreadyInstalled,
}

pub struct AppContext {
    pub config: AppConfig,
    pub preferences: PreferencesStore,
    pub themes: ThemeManager,
    pub notifications: NotificationManager,
    pub console: ConsoleCapture,
    pub converter: ConverterManager,
}

impl AppContext {
    /// Build the process-wide context. A second call fails.
    pub fn install(config: AppConfig) -> Result<Self, ContextError> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ContextError::AlreadyInstalled);
        }
        Ok(Self::build(config))
    }

    fn build(config: AppConfig) -> Self {
        let preferences = PreferencesStore::load(&config.preferences_path);
        let themes = ThemeManager::new(preferences.theme());
        let notifications = NotificationManager::new();
        let console = ConsoleCapture::new(notifications.notifier());

        let factory = DefaultConverterFactory::new(config.backend, &config.program, config.timeout)
            .with_console(console.clone());
        let converter = ConverterManager::new(Arc::new(factory), notifications.notifier());

        tracing::info!(
            backend = %config.backend,
            preferences = %preferences.path().display(),
            "application context ready"
        );
        Self {
            config,
            preferences,
            themes,
            notifications,
            console,
            converter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_install_is_refused() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            preferences_path: dir.path().join("preferences.json"),
            ..AppConfig::default()
        };

        let first = AppContext::install(config.clone());
        assert!(first.is_ok());
        assert!(matches!(
            AppContext::install(config),
            Err(ContextError::AlreadyInstalled)
        ));
        assert!(dir.path().join("preferences.json").exists());
    }
}
