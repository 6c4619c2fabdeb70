//! A small persistent key-value store for operator preferences.
//!
//! Strings and integers live in separate namespaces, so `get_int` on a key
//! that only holds a string returns `None`. Changes stay in memory until
//! [`Preferences::save`] writes `prefs.ron`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const PREFS_FILE: &str = "prefs.ron";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct PrefsFile {
    strings: BTreeMap<String, String>,
    ints: BTreeMap<String, i32>,
}

/// Preference store backed by `prefs.ron` in a config directory.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    values: PrefsFile,
}

impl Preferences {
    /// Open the store in `config_dir`. A missing file is an empty store.
    pub fn open(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(PREFS_FILE);
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(ConfigError::ReadError)?;
            ron::from_str(&contents).map_err(ConfigError::ParseError)?
        } else {
            PrefsFile::default()
        };
        Ok(Self { path, values })
    }

    /// String stored under `key`.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.strings.get(key).map(String::as_str)
    }

    /// Integer stored under `key`.
    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.values.ints.get(key).copied()
    }

    /// Set a string value in memory.
    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.values.strings.insert(key.to_owned(), value.into());
    }

    /// Set an integer value in memory.
    pub fn set_int(&mut self, key: &str, value: i32) {
        self.values.ints.insert(key.to_owned(), value);
    }

    /// Write every value to disk, creating the directory if needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(ConfigError::WriteError)?;
        }
        let serialized = ron::ser::to_string_pretty(&self.values, ron::ser::PrettyConfig::new())
            .map_err(ConfigError::SerializeError)?;
        std::fs::write(&self.path, serialized).map_err(ConfigError::WriteError)?;
        log::debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }

    /// File the store reads from and saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::open(dir.path()).unwrap();
        assert_eq!(prefs.get_string("server_address"), None);
        assert_eq!(prefs.get_int("server_port"), None);
        assert!(!prefs.path().exists());
    }

    #[test]
    fn test_values_persist_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::open(dir.path()).unwrap();
        prefs.set_string("server_address", "192.168.0.10");
        prefs.set_int("server_port", 5556);
        prefs.save().unwrap();

        let reopened = Preferences::open(dir.path()).unwrap();
        assert_eq!(reopened.get_string("server_address"), Some("192.168.0.10"));
        assert_eq!(reopened.get_int("server_port"), Some(5556));
    }

    #[test]
    fn test_unsaved_changes_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::open(dir.path()).unwrap();
        prefs.set_int("server_port", 1);

        let reopened = Preferences::open(dir.path()).unwrap();
        assert_eq!(reopened.get_int("server_port"), None);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::open(dir.path()).unwrap();
        prefs.set_string("key", "text");
        assert_eq!(prefs.get_int("key"), None);
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFS_FILE), "(strings: {").unwrap();
        assert!(matches!(
            Preferences::open(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
