//! Named profile store.
//!
//! A profile binds a name to a reusable directive bundle plus a
//! revert-on-exit flag. Profiles persist as a single pretty-printed JSON
//! file under the user config directory.

use crate::engine::SettingsEngine;
use crate::error::ProfileError;
use crate::log_info;
use crate::models::{ApplicationResult, Profile};
use crate::system::fs::TunableFs;
use crate::system::process::ProcessControl;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// In-memory profile collection, keyed by name.
#[derive(Debug, Default)]
pub struct ProfileManager {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(|s| s.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Add a new profile; the name must be free.
    pub fn create(&mut self, profile: Profile) -> Result<(), ProfileError> {
        if self.profiles.contains_key(&profile.name) {
            return Err(ProfileError::AlreadyExists(profile.name));
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Replace the bundle and flags of an existing profile.
    pub fn update(&mut self, profile: Profile) -> Result<(), ProfileError> {
        if !self.profiles.contains_key(&profile.name) {
            return Err(ProfileError::NotFound(profile.name));
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<Profile, ProfileError> {
        self.profiles
            .remove(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    /// Apply a profile's bundle through the engine.
    pub fn apply<F: TunableFs, P: ProcessControl>(
        &self,
        name: &str,
        engine: &mut SettingsEngine<F, P>,
    ) -> Result<ApplicationResult, ProfileError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        log_info!("[profile] applying '{}'", profile.name);
        Ok(engine.apply_bundle(&profile.bundle))
    }

    /// Revert the session for a profile that asked for it.
    ///
    /// Returns `None` when the profile opted out with `revert_on_exit:
    /// false`, leaving its settings in place past the session.
    pub fn revert_if_requested<F: TunableFs, P: ProcessControl>(
        &self,
        name: &str,
        engine: &mut SettingsEngine<F, P>,
    ) -> Option<ApplicationResult> {
        match self.profiles.get(name) {
            Some(profile) if profile.revert_on_exit => Some(engine.revert_session()),
            _ => None,
        }
    }

    /// Load a profile file; a missing file is an empty store, not an error.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ProfileError::Store(e)),
        };
        let profiles: Vec<Profile> = serde_json::from_str(&content)?;
        let mut manager = Self::default();
        for profile in profiles {
            // Last entry wins on duplicate names in a hand-edited file.
            manager.profiles.insert(profile.name.clone(), profile);
        }
        Ok(manager)
    }

    /// Persist the store, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ProfileError::Store)?;
        }
        let profiles: Vec<&Profile> = self.profiles.values().collect();
        let content = serde_json::to_string_pretty(&profiles)?;
        fs::write(path, content).map_err(ProfileError::Store)?;
        Ok(())
    }
}

/// Default on-disk location of the profile store.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("volt/profiles.json"))
}
