use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::warn;

use crate::error::Result;
use crate::session::Settings;

/// Everything the trainer persists between runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Preferences {
    pub high_score: u32,
    #[serde(flatten)]
    pub settings: Settings,
}

/// Observable, persisted preferences consumed by the game controller
pub trait PreferencesStore: Send + Sync + 'static {
    fn load(&self) -> Preferences;
    /// Change feed; the receiver starts at the current value
    fn subscribe(&self) -> watch::Receiver<Preferences>;
    fn save_high_score(&self, score: u32) -> Result<()>;
    fn save_settings(&self, settings: &Settings) -> Result<()>;
}

/// JSON file under the platform config directory
#[derive(Debug)]
pub struct FilePreferencesStore {
    path: PathBuf,
    // Serializes read-modify-write of the file.
    write_lock: Mutex<()>,
    tx: watch::Sender<Preferences>,
}

impl FilePreferencesStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "nback") {
            pd.config_dir().join("preferences.json")
        } else {
            PathBuf::from("nback_preferences.json")
        };
        Self::with_path(path)
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        let path = p.as_ref().to_path_buf();
        let current = read_preferences(&path);
        let (tx, _rx) = watch::channel(current);
        Self {
            path,
            write_lock: Mutex::new(()),
            tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut prefs = read_preferences(&self.path);
        apply(&mut prefs);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&prefs)?;
        fs::write(&self.path, data)?;
        self.tx.send_replace(prefs);
        Ok(())
    }
}

impl Default for FilePreferencesStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read_preferences(path: &Path) -> Preferences {
    let Ok(bytes) = fs::read(path) else {
        return Preferences::default();
    };
    match serde_json::from_slice::<Preferences>(&bytes) {
        Ok(prefs) => prefs,
        Err(err) => {
            warn!(path = %path.display(), %err, "unreadable preferences, using defaults");
            Preferences::default()
        }
    }
}

impl PreferencesStore for FilePreferencesStore {
    fn load(&self) -> Preferences {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }

    fn save_high_score(&self, score: u32) -> Result<()> {
        self.update(|prefs| prefs.high_score = score)
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.update(|prefs| prefs.settings = *settings)
    }
}

/// Non-persistent store for tests and throwaway sessions
#[derive(Debug)]
pub struct MemoryPreferencesStore {
    tx: watch::Sender<Preferences>,
}

impl MemoryPreferencesStore {
    pub fn new(initial: Preferences) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Simulates an external edit, e.g. another screen changing a setting
    pub fn replace(&self, prefs: Preferences) {
        self.tx.send_replace(prefs);
    }
}

impl Default for MemoryPreferencesStore {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

impl PreferencesStore for MemoryPreferencesStore {
    fn load(&self) -> Preferences {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }

    fn save_high_score(&self, score: u32) -> Result<()> {
        self.tx.send_modify(|prefs| prefs.high_score = score);
        Ok(())
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.tx.send_modify(|prefs| prefs.settings = *settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FilePreferencesStore::with_path(dir.path().join("preferences.json"));
        assert_eq!(store.load(), Preferences::default());
        assert_eq!(store.load().settings.event_interval_ms, 2000);
        assert_eq!(store.load().settings.total_events, 10);
    }

    #[test]
    fn settings_and_high_score_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");
        let store = FilePreferencesStore::with_path(&path);
        let settings = Settings {
            n_back: 3,
            event_interval_ms: 1500,
            total_events: 25,
            grid_size: 4,
            audio_alphabet_size: 8,
        };
        store.save_settings(&settings).unwrap();
        store.save_high_score(7).unwrap();

        let reopened = FilePreferencesStore::with_path(&path);
        assert_eq!(
            reopened.load(),
            Preferences {
                high_score: 7,
                settings
            }
        );
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, b"{not json").unwrap();
        let store = FilePreferencesStore::with_path(&path);
        assert_eq!(store.load(), Preferences::default());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, br#"{"high_score": 4, "n_back": 2}"#).unwrap();
        let prefs = FilePreferencesStore::with_path(&path).load();
        assert_eq!(prefs.high_score, 4);
        assert_eq!(prefs.settings.n_back, 2);
        assert_eq!(prefs.settings.grid_size, 3);
    }

    #[test]
    fn saves_notify_subscribers() {
        let store = MemoryPreferencesStore::default();
        let mut rx = store.subscribe();
        store.save_high_score(11).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().high_score, 11);
    }
}
