// Persistent key-value state shared with the settings UI.
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The four persisted flags. `enabled` and `volume` are user preference;
/// `is_playing` and `headphones_connected` are last-known status mirrored
/// for UI consumption. The derived indicator is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub enabled: bool,
    pub volume: u8,
    pub is_playing: bool,
    pub headphones_connected: bool,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            enabled: false,
            volume: 50,
            is_playing: false,
            headphones_connected: false,
        }
    }
}

/// JSON-file backed store. Every writer replaces only its own field and the
/// whole state is rewritten on each update, so there are no partial-field
/// races to worry about within the single event loop.
pub struct StateStore {
    path: PathBuf,
    state: PersistedState,
}

impl StateStore {
    /// Default store location under the user config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("noisefall")
            .join("state.json")
    }

    /// Open the store, seeding defaults on first run. Corrupt or unreadable
    /// files fall back to defaults with a warning rather than failing.
    pub fn open(path: PathBuf) -> Self {
        let state = match Self::load(&path) {
            Some(state) => state,
            None => {
                let defaults = PersistedState::default();
                let store = Self {
                    path: path.clone(),
                    state: defaults.clone(),
                };
                if let Err(e) = store.save() {
                    warn!("Failed to seed state store at {:?}: {}", path, e);
                }
                return store;
            }
        };
        Self { path, state }
    }

    fn load(path: &Path) -> Option<PersistedState> {
        if !path.exists() {
            info!("No state file at {:?}, seeding defaults", path);
            return None;
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read state file {:?}: {}, using defaults", path, e);
                return None;
            }
        };
        match serde_json::from_str::<PersistedState>(&content) {
            Ok(state) => {
                info!(
                    "Loaded state: enabled={}, volume={}, is_playing={}, headphones_connected={}",
                    state.enabled, state.volume, state.is_playing, state.headphones_connected
                );
                Some(state)
            }
            Err(e) => {
                warn!("Failed to parse state file {:?}: {}, using defaults", path, e);
                None
            }
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.state.enabled = enabled;
        self.save()
    }

    /// Volume is clamped to the 0..=100 range on the way in.
    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.state.volume = volume.min(100);
        self.save()
    }

    pub fn set_is_playing(&mut self, is_playing: bool) -> Result<()> {
        self.state.is_playing = is_playing;
        self.save()
    }

    pub fn set_headphones_connected(&mut self, connected: bool) -> Result<()> {
        self.state.headphones_connected = connected;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_run_seeds_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(path.clone());

        assert_eq!(*store.state(), PersistedState::default());
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::open(path.clone());
        store.set_enabled(true).unwrap();
        store.set_volume(80).unwrap();
        store.set_headphones_connected(true).unwrap();

        let reopened = StateStore::open(path);
        assert!(reopened.state().enabled);
        assert_eq!(reopened.state().volume, 80);
        assert!(reopened.state().headphones_connected);
        assert!(!reopened.state().is_playing);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let store = StateStore::open(path);
        assert_eq!(*store.state(), PersistedState::default());
    }

    #[test]
    fn test_missing_fields_fill_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"enabled": true}"#).unwrap();

        let store = StateStore::open(path);
        assert!(store.state().enabled);
        assert_eq!(store.state().volume, 50);
    }

    #[test]
    fn test_volume_clamped() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.set_volume(200).unwrap();
        assert_eq!(store.state().volume, 100);
    }
}
