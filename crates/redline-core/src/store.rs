use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::provider::ProviderConfig;

const PROVIDER_FILE: &str = "provider.json";

/// Remembers the last-used provider configuration between sessions.
///
/// Read once at startup and written when the user saves new settings.
/// The review code never touches it; configuration is always passed in.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(PROVIDER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing has been saved yet. A corrupt file is logged and
    /// treated as absent so a bad write never blocks startup.
    pub fn load(&self) -> Result<Option<ProviderConfig>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        match serde_json::from_str(&contents) {
            Ok(cfg) => Ok(Some(cfg)),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable provider settings: {}", e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, config: &ProviderConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        info!(provider = %config.provider, "saved provider settings");
        Ok(())
    }
}
