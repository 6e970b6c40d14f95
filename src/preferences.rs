use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::style::ThemeMode;

pub const MIN_ZOOM: i32 = -5;
pub const MAX_ZOOM: i32 = 5;
pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (1024, 768);
pub const DEFAULT_MAX_RECENT: usize = 10;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to write preferences to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFile {
    pub path: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: ThemeMode,
    pub zoom_level: i32,
    pub recent_files: Vec<RecentFile>,
    pub window_size: (u32, u32),
    pub window_position: Option<(i32, i32)>,
    pub max_recent_files: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: ThemeMode::Light,
            zoom_level: 0,
            recent_files: Vec::new(),
            window_size: DEFAULT_WINDOW_SIZE,
            window_position: None,
            max_recent_files: DEFAULT_MAX_RECENT,
        }
    }
}

/// Owns the preferences document and its file. Every setter rewrites the
/// whole file; write failures are logged and never surface to the user.
pub struct PreferencesStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferencesStore {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("markitdown_ui");
        path.push("preferences.json");
        path
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Preferences>(&contents) {
                Ok(mut prefs) => {
                    prefs.zoom_level = prefs.zoom_level.clamp(MIN_ZOOM, MAX_ZOOM);
                    prefs.recent_files.truncate(prefs.max_recent_files);
                    prefs
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), notify = false, "malformed preferences, using defaults: {e}");
                    Preferences::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no preferences file, writing defaults");
                let store = Self {
                    path,
                    prefs: Preferences::default(),
                };
                store.persist();
                return store;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), notify = false, "cannot read preferences, using defaults: {e}");
                Preferences::default()
            }
        };
        Self { path, prefs }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self) -> Result<(), PreferencesError> {
        let json = serde_json::to_string_pretty(&self.prefs)?;
        let write_err = |source| PreferencesError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::error!(notify = false, "{e}");
        }
    }

    pub fn theme(&self) -> ThemeMode {
        self.prefs.theme
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.prefs.theme = theme;
        self.persist();
    }

    pub fn zoom_level(&self) -> i32 {
        self.prefs.zoom_level
    }

    /// Clamped to `MIN_ZOOM..=MAX_ZOOM`.
    pub fn set_zoom_level(&mut self, level: i32) -> i32 {
        self.prefs.zoom_level = level.clamp(MIN_ZOOM, MAX_ZOOM);
        self.persist();
        self.prefs.zoom_level
    }

    pub fn recent_files(&self) -> &[RecentFile] {
        &self.prefs.recent_files
    }

    pub fn add_recent_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let normalized = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        self.prefs.recent_files.retain(|f| f.path != normalized);
        self.prefs.recent_files.insert(
            0,
            RecentFile {
                path: normalized,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        );
        self.prefs.recent_files.truncate(self.prefs.max_recent_files);
        self.persist();
    }

    pub fn remove_recent_file(&mut self, path: &Path) {
        let before = self.prefs.recent_files.len();
        self.prefs.recent_files.retain(|f| f.path != path);
        if self.prefs.recent_files.len() != before {
            self.persist();
        }
    }

    pub fn clear_recent_files(&mut self) {
        self.prefs.recent_files.clear();
        self.persist();
    }

    pub fn max_recent_files(&self) -> usize {
        self.prefs.max_recent_files
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.prefs.window_size
    }

    pub fn window_position(&self) -> Option<(i32, i32)> {
        self.prefs.window_position
    }

    /// Size and position in one write, used on window close.
    pub fn set_window_geometry(&mut self, size: (u32, u32), position: Option<(i32, i32)>) {
        self.prefs.window_size = size;
        if position.is_some() {
            self.prefs.window_position = position;
        }
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> PreferencesStore {
        PreferencesStore::load(dir.path().join("prefs").join("preferences.json"))
    }

    #[test]
    fn first_run_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.path().exists());
        assert_eq!(store.preferences(), &Preferences::default());
        assert_eq!(store.window_size(), (1024, 768));
        assert_eq!(store.window_position(), None);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "{ not json").unwrap();

        let store = PreferencesStore::load(&path);
        assert_eq!(store.preferences(), &Preferences::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, r#"{"theme": "dark", "zoom_level": 42}"#).unwrap();

        let store = PreferencesStore::load(&path);
        assert_eq!(store.theme(), ThemeMode::Dark);
        assert_eq!(store.zoom_level(), MAX_ZOOM);
        assert_eq!(store.max_recent_files(), DEFAULT_MAX_RECENT);
    }

    #[test]
    fn recent_files_dedupe_order_and_cap() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        for i in 0..12 {
            store.add_recent_file(dir.path().join(format!("doc{i}.pdf")));
        }
        store.add_recent_file(dir.path().join("doc5.pdf"));

        let files = store.recent_files();
        assert_eq!(files.len(), DEFAULT_MAX_RECENT);
        assert_eq!(files[0].path, dir.path().join("doc5.pdf"));
        assert_eq!(files[1].path, dir.path().join("doc11.pdf"));
        let doc5 = files.iter().filter(|f| f.path.ends_with("doc5.pdf")).count();
        assert_eq!(doc5, 1);
    }

    #[test]
    fn re_adding_refreshes_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let a = dir.path().join("a.docx");
        let b = dir.path().join("b.docx");

        store.add_recent_file(&a);
        let first = store.recent_files()[0].timestamp;
        store.add_recent_file(&b);
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_recent_file(&a);

        assert_eq!(store.recent_files()[0].path, a);
        assert!(store.recent_files()[0].timestamp > first);
        assert_eq!(store.recent_files().len(), 2);
    }

    #[test]
    fn relative_paths_are_normalized() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add_recent_file("report.xlsx");

        let stored = &store.recent_files()[0].path;
        assert!(stored.is_absolute());
        assert!(stored.ends_with("report.xlsx"));
    }

    #[test]
    fn round_trips_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        {
            let mut store = PreferencesStore::load(&path);
            store.set_theme(ThemeMode::Dark);
            store.set_zoom_level(3);
            store.add_recent_file(dir.path().join("x.pptx"));
            store.set_window_geometry((1280, 800), Some((10, 20)));
        }

        let reloaded = PreferencesStore::load(&path);
        assert_eq!(reloaded.theme(), ThemeMode::Dark);
        assert_eq!(reloaded.zoom_level(), 3);
        assert_eq!(reloaded.window_size(), (1280, 800));
        assert_eq!(reloaded.window_position(), Some((10, 20)));
        assert_eq!(reloaded.recent_files()[0].path, dir.path().join("x.pptx"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn theme_and_clear() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.set_theme(ThemeMode::Dark);
        assert_eq!(PreferencesStore::load(store.path()).theme(), ThemeMode::Dark);

        store.add_recent_file(dir.path().join("a.txt"));
        store.remove_recent_file(&dir.path().join("a.txt"));
        assert!(store.recent_files().is_empty());
        store.add_recent_file(dir.path().join("b.txt"));
        store.clear_recent_files();
        assert!(store.recent_files().is_empty());
    }

    #[test]
    fn theme_serializes_lowercase() {
        let json = serde_json::to_string(&Preferences::default()).unwrap();
        assert!(json.contains(r#""theme":"light""#));
    }
}
