//! Persistent config entries: one per configured camera.
//!
//! Stored as a JSON array. Writes go to `<file>.tmp` and are renamed over
//! the store file so a crash never leaves it half-written.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DeviceConfig;
use crate::error::{HikError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id:   String,
    pub title:      String,
    /// Host of the camera; at most one entry per host.
    pub unique_id:  String,
    pub data:       DeviceConfig,
    pub created_at: DateTime<Utc>,
}

/// Unique id of the entry for `host`.
pub fn unique_id_for(host: &str) -> String {
    host.trim().to_ascii_lowercase()
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, data: DeviceConfig) -> Self {
        Self {
            entry_id:   Uuid::new_v4().to_string(),
            title:      title.into(),
            unique_id:  unique_id_for(&data.host),
            data,
            created_at: Utc::now(),
        }
    }
}

pub struct EntryStore {
    path:    PathBuf,
    entries: Vec<ConfigEntry>,
}

impl EntryStore {
    /// Load the store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(s) if s.trim().is_empty() => Vec::new(),
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No entry store at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: path.to_path_buf(), entries })
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn get(&self, entry_id: &str) -> Option<&ConfigEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    pub fn has_unique_id(&self, unique_id: &str) -> bool {
        let wanted = unique_id_for(unique_id);
        self.entries.iter().any(|e| e.unique_id == wanted)
    }

    pub fn unique_ids(&self) -> HashSet<String> {
        self.entries.iter().map(|e| e.unique_id.clone()).collect()
    }

    /// Add and persist an entry. Rejects a second entry for the same host.
    pub fn add(&mut self, entry: ConfigEntry) -> Result<()> {
        if self.has_unique_id(&entry.unique_id) {
            return Err(HikError::Validation(format!("{} is already configured", entry.unique_id)));
        }
        info!("Adding entry {} ({})", entry.entry_id, entry.title);
        self.entries.push(entry);
        if let Err(e) = self.save() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove and persist. Returns the removed entry, if it existed.
    pub fn remove(&mut self, entry_id: &str) -> Result<Option<ConfigEntry>> {
        let Some(pos) = self.entries.iter().position(|e| e.entry_id == entry_id) else {
            return Ok(None);
        };
        let removed = self.entries.remove(pos);
        self.save()?;
        info!("Removed entry {} ({})", removed.entry_id, removed.title);
        Ok(Some(removed))
    }

    fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::load(&dir.path().join("nope.json")).unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn add_reload_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/entries.json");

        let mut store = EntryStore::load(&path).unwrap();
        let entry = ConfigEntry::new("Camera 192.0.2.5", DeviceConfig::new("192.0.2.5", "pw"));
        let id = entry.entry_id.clone();
        store.add(entry.clone()).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = EntryStore::load(&path).unwrap();
        assert_eq!(reloaded.entries(), &[entry]);
        assert!(reloaded.has_unique_id("192.0.2.5"));
        assert!(reloaded.unique_ids().contains(&unique_id_for(" 192.0.2.5")));

        let mut store = reloaded;
        assert!(store.remove("unknown").unwrap().is_none());
        assert_eq!(store.remove(&id).unwrap().unwrap().entry_id, id);
        assert!(EntryStore::load(&path).unwrap().entries().is_empty());
    }

    #[test]
    fn duplicate_host_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EntryStore::load(&dir.path().join("e.json")).unwrap();
        store.add(ConfigEntry::new("a", DeviceConfig::new("Cam.Local", "x"))).unwrap();
        let err = store.add(ConfigEntry::new("b", DeviceConfig::new("cam.local", "y"))).unwrap_err();
        assert!(matches!(err, HikError::Validation(_)));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(EntryStore::load(&path), Err(HikError::Json(_))));
    }
}
