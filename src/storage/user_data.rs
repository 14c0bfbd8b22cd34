//! Namespaced JSON blob persisted to a single file.
//!
//! Top-level keys are logical namespaces (`Prescriptions`, `Settings`,
//! rate-limiter windows). Stores read their namespace once, mutate their own
//! copy, and write it back through `set` + `save`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::UserDataError;

/// Handle shared by every store that persists through the same file.
pub type SharedUserData = Arc<Mutex<UserDataStore>>;

pub struct UserDataStore {
    path: PathBuf,
    values: Map<String, Value>,
    loaded: bool,
}

impl UserDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: Map::new(),
            loaded: false,
        }
    }

    pub fn shared(path: impl Into<PathBuf>) -> SharedUserData {
        Arc::new(Mutex::new(Self::new(path)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Read the file once. Missing or unreadable files leave an empty object.
    pub fn load(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No user data file yet");
            return;
        }

        match read_object(&self.path) {
            Ok(values) => {
                tracing::debug!(keys = values.len(), "User data loaded");
                self.values = values;
            }
            Err(e) => {
                tracing::error!(error = %e, path = %self.path.display(), "Failed to load user data");
            }
        }
    }

    /// Stored value for `key`, or `default` (which is then stored in memory).
    ///
    /// A value that no longer deserializes is replaced by the default.
    pub fn try_get<T>(&mut self, key: &str, default: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        self.load();
        if let Some(value) = self.values.get(key) {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(parsed) => return parsed,
                Err(e) => {
                    tracing::warn!(key, error = %e, "Stored value has unexpected shape, using default");
                }
            }
        }
        if let Ok(value) = serde_json::to_value(&default) {
            self.values.insert(key.to_string(), value);
        }
        default
    }

    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        self.load();
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&mut self, key: &str) -> bool {
        self.load();
        self.values.contains_key(key)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), UserDataError> {
        self.load();
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a namespace from memory. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.load();
        self.values.remove(key).is_some()
    }

    /// Write the whole object to disk (temp file + rename).
    pub fn save(&self) -> Result<(), UserDataError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| UserDataError::Io {
            path: dir.clone(),
            source,
        })?;

        let serialized = serde_json::to_string_pretty(&self.values)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|source| UserDataError::Io {
            path: dir.clone(),
            source,
        })?;
        tmp.write_all(serialized.as_bytes())
            .map_err(|source| UserDataError::Io {
                path: tmp.path().to_path_buf(),
                source,
            })?;
        tmp.persist(&self.path).map_err(|e| UserDataError::Persist {
            path: self.path.clone(),
            reason: e.error.to_string(),
        })?;

        tracing::trace!(path = %self.path.display(), bytes = serialized.len(), "User data saved");
        Ok(())
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>, UserDataError> {
    let contents = fs::read_to_string(path).map_err(|source| UserDataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, UserDataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = UserDataStore::new(dir.path().join("userData.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, mut store) = temp_store();
        store.load();
        assert!(store.is_loaded());
        assert!(!store.contains("Prescriptions"));
    }

    #[test]
    fn try_get_inserts_default() {
        let (_dir, mut store) = temp_store();
        let v: Vec<u32> = store.try_get("Numbers", vec![1, 2]);
        assert_eq!(v, vec![1, 2]);
        assert!(store.contains("Numbers"));
    }

    #[test]
    fn save_then_reload_round_trips_namespaces() {
        let (dir, mut store) = temp_store();
        store.set("Settings", &serde_json::json!({"snoozeTime": 10})).unwrap();
        store.set("Prescriptions", &Vec::<u32>::new()).unwrap();
        store.save().unwrap();

        let mut reopened = UserDataStore::new(dir.path().join("userData.json"));
        let settings: serde_json::Value = reopened.get("Settings").unwrap();
        assert_eq!(settings["snoozeTime"], 10);
        assert!(reopened.contains("Prescriptions"));
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let (dir, _) = temp_store();
        let path = dir.path().join("userData.json");
        fs::write(&path, "{ not json").unwrap();

        let mut store = UserDataStore::new(&path);
        store.load();
        assert!(store.is_loaded());
        let v: Vec<u32> = store.try_get("Numbers", Vec::new());
        assert!(v.is_empty());
    }

    #[test]
    fn mismatched_shape_falls_back_to_default() {
        let (_dir, mut store) = temp_store();
        store.set("Numbers", &"not a list").unwrap();
        let v: Vec<u32> = store.try_get("Numbers", vec![7]);
        assert_eq!(v, vec![7]);
    }

    #[test]
    fn delete_removes_namespace() {
        let (_dir, mut store) = temp_store();
        store.set("Auth", &serde_json::json!({"token": null})).unwrap();
        assert!(store.delete("Auth"));
        assert!(!store.delete("Auth"));
    }

    #[test]
    fn load_runs_once() {
        let (dir, mut store) = temp_store();
        store.load();
        // Written after the first load: not picked up.
        fs::write(dir.path().join("userData.json"), r#"{"Late": 1}"#).unwrap();
        store.load();
        assert!(!store.contains("Late"));
    }

    #[test]
    fn save_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("userData.json");
        let mut store = UserDataStore::new(&path);
        store.set("K", &1).unwrap();
        store.save().unwrap();
        assert!(path.exists());
    }
}
