//! Terminal profile persistence
//!
//! Save/load/list/delete `TerminalSettings` profiles as JSON files in a
//! profile directory (by default under the platform config directory).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::domain::{LegacySettings, TerminalError, TerminalResult, TerminalSettings};

/// Profile that always exists and cannot be deleted
pub const DEFAULT_PROFILE: &str = "Default";

/// Longest profile name accepted, in characters
const MAX_NAME_CHARS: usize = 64;

/// A directory of `<name>.json` profile files
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> TerminalResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            TerminalError::Profile(format!("Failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    /// `<config dir>/serial-tools/profiles`
    pub fn default_dir() -> TerminalResult<PathBuf> {
        dirs::config_dir()
            .map(|base| base.join("serial-tools").join("profiles"))
            .ok_or_else(|| TerminalError::Profile("No configuration directory on this platform".into()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> TerminalResult<PathBuf> {
        let name = checked_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    pub fn save(&self, settings: &TerminalSettings) -> TerminalResult<()> {
        let path = self.path_for(&settings.name)?;
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| TerminalError::Profile(format!("Serialization error: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| TerminalError::Profile(format!("Failed to write profile: {e}")))?;
        log::debug!("Saved profile to {}", path.display());
        Ok(())
    }

    /// Load a profile. A missing `Default` profile yields the built-in defaults.
    pub fn load(&self, name: &str) -> TerminalResult<TerminalSettings> {
        let path = self.path_for(name)?;
        if !path.exists() && name.trim() == DEFAULT_PROFILE {
            return Ok(TerminalSettings::default());
        }
        let json = std::fs::read_to_string(&path)
            .map_err(|e| TerminalError::Profile(format!("Failed to read profile '{name}': {e}")))?;
        serde_json::from_str(&json)
            .map_err(|e| TerminalError::Profile(format!("Failed to parse profile '{name}': {e}")))
    }

    /// Sorted names of the `.json` profile files in the store
    pub fn list(&self) -> TerminalResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| TerminalError::Profile(format!("Failed to read profile dir: {e}")))?;

        let mut names = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
                continue;
            }
            let path = entry.path();
            if path.extension() != Some(OsStr::new("json")) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(OsStr::to_str) {
                names.push(stem.to_owned());
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> TerminalResult<()> {
        let path = self.path_for(name)?;
        if name.trim() == DEFAULT_PROFILE {
            return Err(TerminalError::Profile(
                "Cannot delete the Default profile".to_string(),
            ));
        }
        if !path.exists() {
            return Err(TerminalError::Profile(format!("Profile '{name}' not found")));
        }
        std::fs::remove_file(&path)
            .map_err(|e| TerminalError::Profile(format!("Failed to delete profile '{name}': {e}")))
    }

    /// Convert a flat key/value session file and store it as profile `name`
    pub fn import_legacy(&self, file: &Path, name: &str) -> TerminalResult<TerminalSettings> {
        let json = std::fs::read_to_string(file).map_err(|e| {
            TerminalError::Profile(format!("Failed to read {}: {e}", file.display()))
        })?;
        let legacy: LegacySettings = serde_json::from_str(&json).map_err(|e| {
            TerminalError::Profile(format!("Failed to parse {}: {e}", file.display()))
        })?;
        let settings = legacy.into_settings(name)?;
        self.save(&settings)?;
        Ok(settings)
    }
}

/// A profile name doubles as a file stem: letters, digits, space, `-` and
/// `_` only. That rules out separators and dots, so a name can never leave
/// the profile directory.
fn checked_name(name: &str) -> TerminalResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TerminalError::Profile("Profile name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(TerminalError::Profile(format!(
            "Profile name is longer than {MAX_NAME_CHARS} characters"
        )));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_');
    match name.chars().find(|&c| !allowed(c)) {
        Some(c) => Err(TerminalError::Profile(format!(
            "Profile name '{name}' may not contain '{c}'"
        ))),
        None => Ok(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn device_paths_are_not_profile_names() {
        assert!(checked_name("/dev/ttyUSB0").is_err());
        assert!(checked_name("..\\COM3").is_err());
        assert!(checked_name("ttyS0:9600").is_err());
        assert!(checked_name("gps.json").is_err());
    }

    #[test]
    fn bench_names_are_accepted_and_trimmed() {
        assert_eq!(checked_name("  COM3 bench ").unwrap(), "COM3 bench");
        assert_eq!(checked_name("Logic-Analyzer_2").unwrap(), "Logic-Analyzer_2");
        assert_eq!(checked_name("Überwachung").unwrap(), "Überwachung");
    }

    #[test]
    fn blank_and_overlong_names_are_rejected() {
        assert!(checked_name("\t ").is_err());
        assert!(checked_name(&"9".repeat(MAX_NAME_CHARS)).is_ok());
        assert!(checked_name(&"9".repeat(MAX_NAME_CHARS + 1)).is_err());
    }

    #[test]
    fn missing_default_profile_loads_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load(DEFAULT_PROFILE).unwrap(), TerminalSettings::default());
        assert!(store.load("Modem 56k").is_err());
    }

    #[test]
    fn list_skips_other_files_and_directories() {
        let (dir, store) = store();
        store
            .save(&TerminalSettings {
                name: "Console 115200".to_string(),
                ..TerminalSettings::default()
            })
            .unwrap();
        std::fs::write(dir.path().join("session.prefs"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("archive.json")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["Console 115200"]);
    }

    #[test]
    fn default_profile_cannot_be_deleted() {
        let (_dir, store) = store();
        store.save(&TerminalSettings::default()).unwrap();
        assert!(store.delete(DEFAULT_PROFILE).is_err());
        assert!(store.delete("Never Saved").is_err());
        assert_eq!(store.list().unwrap(), vec![DEFAULT_PROFILE]);
    }
}
