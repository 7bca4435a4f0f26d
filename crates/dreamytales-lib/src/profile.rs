//! Child profile persistence — one JSON file in a fixed slot.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use dreamytales_core::types::UserProfile;

use crate::{Error, Result};

/// File name of the single profile slot.
pub const PROFILE_SLOT: &str = "dreamytales_profile.json";

/// Platform data directory for dreamytales (e.g. `~/.local/share/dreamytales`).
pub fn default_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dreamytales")
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Store whose slot lives under `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(PROFILE_SLOT),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved profile, or `None` when nothing (readable) is stored.
    pub async fn load(&self) -> Option<UserProfile> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("profile: failed to read {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("profile: ignoring unreadable {}: {e}", self.path.display());
                None
            }
        }
    }

    pub async fn save(&self, profile: &UserProfile) -> Result<()> {
        if profile.name.trim().is_empty() {
            return Err(Error::InvalidRequest("Profile name is empty".into()));
        }
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Storage(format!("failed to create {}: {e}", dir.display())))?;
        }
        let json = serde_json::to_vec_pretty(profile).map_err(|e| Error::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", self.path.display())))?;
        debug!("profile: saved to {}", self.path.display());
        Ok(())
    }

    /// Remove the slot. Clearing an empty slot is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
