//! Persisted operator preferences

use pooldash_core::PoolResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Preferences kept across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub dark_mode: bool,
    /// Access key the dashboard is locked with, if any
    pub access_key: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: true,
            access_key: None,
        }
    }
}

/// Preferences loaded once at startup and written back on every change
#[derive(Debug)]
pub struct PreferenceStore {
    /// Backing file; `None` keeps preferences in memory only
    path: Option<PathBuf>,
    prefs: RwLock<Preferences>,
}

impl PreferenceStore {
    /// Load preferences from `path`.
    ///
    /// A missing, unreadable or corrupt file yields the defaults.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(prefs) => {
                    debug!(path = %path.display(), "Loaded preferences");
                    prefs
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt preferences file, using defaults"
                    );
                    Preferences::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable preferences file, using defaults"
                );
                Preferences::default()
            }
        };

        Self {
            path: Some(path),
            prefs: RwLock::new(prefs),
        }
    }

    pub fn in_memory(prefs: Preferences) -> Self {
        Self {
            path: None,
            prefs: RwLock::new(prefs),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self) -> Preferences {
        self.prefs.read().await.clone()
    }

    pub async fn set_dark_mode(&self, dark: bool) -> PoolResult<()> {
        self.update(|p| p.dark_mode = dark).await
    }

    pub async fn set_access_key(&self, key: Option<String>) -> PoolResult<()> {
        self.update(|p| p.access_key = key).await
    }

    async fn update(&self, change: impl FnOnce(&mut Preferences)) -> PoolResult<()> {
        let mut prefs = self.prefs.write().await;
        change(&mut prefs);
        self.save(&prefs).await
    }

    async fn save(&self, prefs: &Preferences) -> PoolResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(prefs)?;
        tokio::fs::write(path, contents).await?;
        info!(path = %path.display(), "Saved preferences");
        Ok(())
    }
}
