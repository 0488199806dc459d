//! Durable storage for the endpoint registry.
//!
//! One JSON file (`config.json`) holds every endpoint plus the active name.
//!
//! load:
//!   - missing file  -> synthesize `default` state and persist it
//!   - corrupt file  -> rename to `<path>.bak.<timestamp>`, synthesize, persist
//!   - dangling `current` -> reset to `default`, persist
//!
//! save: pretty JSON written to a sibling temp file, fsync'd, renamed over the target.
//!
//! lock: exclusive advisory lock on `<path>.lock` (fs2) for read-modify-write cycles.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DEFAULT_NAME, RegistryState};

/// Subdirectory of the platform config directory owned by this tool.
pub const APP_DIR_NAME: &str = "ollamanager";

/// File name of the registry inside [`APP_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Errors raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The platform config directory could not be determined.
    #[error("could not determine the user configuration directory")]
    ConfigDirUnavailable,

    /// The directory holding the registry could not be created.
    #[error("failed to create config directory {}: {source}", .path.display())]
    ConfigDirCreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading, writing or renaming a registry file failed.
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The state could not be encoded.
    #[error("failed to encode registry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The advisory lock could not be taken.
    #[error("failed to lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistence seam used by [`super::Registry`].
pub trait StateStore {
    fn save(&self, state: &RegistryState) -> Result<(), StoreError>;
}

/// Locate the platform config directory for this tool.
pub fn platform_config_dir() -> Result<PathBuf, StoreError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(StoreError::ConfigDirUnavailable)
}

/// File-backed registry store.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    /// Resolve the registry location and make sure its directory exists.
    ///
    /// An explicit `path` wins. Otherwise the platform config directory is used,
    /// degrading to `./ollamanager` when the platform gives no answer.
    pub fn open(path: Option<PathBuf>) -> Result<Self, StoreError> {
        let path = match path {
            Some(p) => p,
            None => match platform_config_dir() {
                Ok(dir) => dir.join(CONFIG_FILE_NAME),
                Err(e) => {
                    warn!("{e}; falling back to the current directory");
                    PathBuf::from(".").join(APP_DIR_NAME).join(CONFIG_FILE_NAME)
                }
            },
        };
        Self::at(path)
    }

    /// Use `path` as the registry file, creating its parent directories.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::ConfigDirCreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, ".lock")
    }

    /// Take the exclusive advisory lock; released when the guard drops.
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Lock {
                path: path.clone(),
                source,
            })?;
        file.lock_exclusive().map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "registry lock acquired");
        Ok(StoreLock { file })
    }

    /// Load the registry, repairing or recreating it as needed.
    pub fn load(&self) -> Result<RegistryState, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let state = RegistryState::default();
                self.save(&state)?;
                info!("Created default config at {}", self.path.display());
                return Ok(state);
            }
            Err(e) => return Err(StoreError::io("failed to read", &self.path, e)),
        };

        let mut state = match serde_json::from_slice::<RegistryState>(&bytes) {
            Ok(state) => state,
            Err(parse_err) => {
                debug!("registry parse error: {parse_err}");
                let backup = self.backup_corrupt()?;
                warn!("Backed up corrupted config to: {}", backup.display());
                let state = RegistryState::default();
                self.save(&state)?;
                info!("Created new default config due to corruption");
                return Ok(state);
            }
        };

        if state.find(&state.active_name).is_none() {
            warn!(
                current = %state.active_name,
                "current server does not exist; switching to '{DEFAULT_NAME}'"
            );
            state.active_name = DEFAULT_NAME.to_string();
            self.save(&state)?;
        }
        Ok(state)
    }

    /// Move the current file aside without touching its bytes.
    fn backup_corrupt(&self) -> Result<PathBuf, StoreError> {
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let base = sibling(&self.path, &format!(".bak.{stamp}"));
        let mut backup = base.clone();
        let mut n = 1;
        while backup.exists() {
            backup = sibling(&base, &format!(".{n}"));
            n += 1;
        }
        fs::rename(&self.path, &backup)
            .map_err(|e| StoreError::io("failed to back up", &self.path, e))?;
        Ok(backup)
    }

    /// Write `state` atomically (temp file + fsync + rename).
    pub fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        let mut encoded = serde_json::to_string_pretty(state)?;
        encoded.push('\n');

        let tmp = sibling(&self.path, &format!(".{}.tmp", std::process::id()));
        if let Err(e) = write_synced(&tmp, encoded.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io("failed to write", &tmp, e));
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io("failed to replace", &self.path, e));
        }
        debug!(path = %self.path.display(), servers = state.endpoints.len(), "registry saved");
        Ok(())
    }
}

impl StateStore for RegistryStore {
    fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        RegistryStore::save(self, state)
    }
}

/// Guard for [`RegistryStore::lock`].
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to release registry lock: {e}");
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
