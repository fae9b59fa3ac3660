//! Persistent state store for the installation lifecycle
//!
//! Two small durable records live under the platform data dir: the
//! installation-complete marker (existence is the authoritative bit, the JSON
//! body is kept for compatibility) and the setup-configuration record produced
//! by the installer's setup step. Both round-trip through serde_json.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::config;

/// Arbitrary key/value record produced by the setup sequence
pub type SetupConfig = Map<String, Value>;

/// Reads and writes the install marker and setup-configuration record
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Store rooted at the platform data dir (`~/.local/share/coredesk` on
    /// Linux)
    pub fn at_default_location() -> Self {
        let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push(config::APP_DIR);
        Self { dir }
    }

    /// Store rooted at an explicit directory (CLI override and tests)
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(config::INSTALL_MARKER)
    }

    fn setup_config_path(&self) -> PathBuf {
        self.dir.join(config::SETUP_CONFIG)
    }

    /// True when the installation-complete marker exists
    pub fn is_installed(&self) -> bool {
        self.marker_path().exists()
    }

    /// Write the installation-complete marker
    pub fn write_install_marker(&self) -> Result<()> {
        let path = self.marker_path();
        self.ensure_dir()?;
        fs::write(&path, json!({ "installed": true }).to_string())
            .context(format!("Failed to write install marker at {}", path.display()))?;
        info!(path = %path.display(), "Wrote install marker");
        Ok(())
    }

    /// Delete the installation-complete marker, tolerating prior absence
    pub fn clear_install_marker(&self) -> Result<()> {
        let path = self.marker_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Cleared install marker");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).context(format!("Failed to remove install marker at {}", path.display()))
            }
        }
    }

    /// Persist the setup-configuration record
    pub fn save_setup_config(&self, setup: &SetupConfig) -> Result<()> {
        let path = self.setup_config_path();
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(setup)
            .context("Failed to serialize setup configuration")?;
        fs::write(&path, json)
            .context(format!("Failed to write setup configuration at {}", path.display()))?;
        info!(path = %path.display(), keys = setup.len(), "Saved setup configuration");
        Ok(())
    }

    /// Read the persisted setup configuration
    ///
    /// A missing or unreadable record yields `None` rather than an error; the
    /// installer treats the configuration as best-effort data.
    pub fn load_setup_config(&self) -> Option<SetupConfig> {
        let path = self.setup_config_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Setup configuration unreadable");
                return None;
            }
        };
        match serde_json::from_str::<SetupConfig>(&raw) {
            Ok(setup) => Some(setup),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Setup configuration corrupt, treating as absent");
                None
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .context(format!("Failed to create data directory {}", self.dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::at(dir.path().join("coredesk"));
        (dir, store)
    }

    #[test]
    fn test_marker_roundtrip() {
        let (_dir, store) = temp_store();
        assert!(!store.is_installed());

        store.write_install_marker().unwrap();
        assert!(store.is_installed());

        store.clear_install_marker().unwrap();
        assert!(!store.is_installed());
    }

    #[test]
    fn test_clear_marker_tolerates_absence() {
        let (_dir, store) = temp_store();
        // Never written - clearing twice must still succeed
        store.clear_install_marker().unwrap();
        store.clear_install_marker().unwrap();
    }

    #[test]
    fn test_setup_config_roundtrip() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load_setup_config(), None);

        let mut setup = SetupConfig::new();
        setup.insert("username".to_string(), json!("alice"));
        setup.insert("theme".to_string(), json!("dark"));
        store.save_setup_config(&setup).unwrap();

        assert_eq!(store.load_setup_config(), Some(setup));
    }

    #[test]
    fn test_corrupt_setup_config_reads_as_absent() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join(config::SETUP_CONFIG), "not json {{{").unwrap();

        assert_eq!(store.load_setup_config(), None);
    }

    #[test]
    fn test_marker_body_is_compatible_json() {
        let (_dir, store) = temp_store();
        store.write_install_marker().unwrap();

        let raw = fs::read_to_string(store.dir().join(config::INSTALL_MARKER)).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({ "installed": true }));
    }
}
