//! Persisted install location
//!
//! The chosen install location is kept as the entire contents of a one-line
//! text file beside this program's own install tree. A missing file and an
//! empty one mean different things: missing means no location was ever
//! recorded, empty means the managed install was explicitly removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use super::download::{BINARY_NAME, Platform};

/// File holding the install location
pub const LOCATION_FILE: &str = "install-location.txt";

/// What the location file currently says
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLocation {
    /// No location file exists
    Unrecorded,
    /// The file exists but is blank
    Cleared,
    Recorded(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("failed to find executable path: {0}")]
    CurrentExe(#[source] io::Error),

    #[error("cannot determine install directory from {}", .0.display())]
    NoInstallDir(PathBuf),

    #[error("failed to read install location from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write install location to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to locate previous installation at {}: {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads and writes the persisted install location
#[derive(Debug, Clone)]
pub struct LocationStore {
    path: PathBuf,
}

impl LocationStore {
    /// Store backed by an explicit state file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the parent of the directory holding the running binary.
    ///
    /// The installer ships as `<root>/bin/ollama-installer`, so the state file
    /// lands at `<root>/install-location.txt`.
    pub fn beside_current_exe() -> Result<Self, LocationError> {
        let exe = std::env::current_exe().map_err(LocationError::CurrentExe)?;
        let root = exe
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| LocationError::NoInstallDir(exe.clone()))?;
        Ok(Self::new(root.join(LOCATION_FILE)))
    }

    /// Path of the state file itself
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the state file
    pub fn state_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Read the state file
    pub fn load(&self) -> Result<StoredLocation, LocationError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let location = contents.trim_end();
                if location.trim().is_empty() {
                    Ok(StoredLocation::Cleared)
                } else {
                    Ok(StoredLocation::Recorded(PathBuf::from(location)))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoredLocation::Unrecorded),
            Err(source) => Err(LocationError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Persist `location`
    pub fn save(&self, location: &Path) -> Result<(), LocationError> {
        self.write(&location.to_string_lossy())
    }

    /// Record that the managed install has been removed
    pub fn clear(&self) -> Result<(), LocationError> {
        self.write("")
    }

    fn write(&self, contents: &str) -> Result<(), LocationError> {
        fs::write(&self.path, contents).map_err(|source| LocationError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Location used when nothing usable is recorded
    pub(crate) fn default_location(&self) -> PathBuf {
        self.state_dir().join(BINARY_NAME)
    }

    /// Current install location, or the default one if not currently installed.
    ///
    /// A recorded location wins only while it still exists. This does not
    /// find installs made outside this tool.
    pub fn resolve(&self) -> Result<PathBuf, LocationError> {
        if let StoredLocation::Recorded(previous) = self.load()? {
            match fs::metadata(&previous) {
                Ok(_) => return Ok(previous),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Recorded location {} no longer exists", previous.display());
                }
                Err(source) => {
                    return Err(LocationError::Inspect {
                        path: previous,
                        source,
                    });
                }
            }
        }
        Ok(self.default_location())
    }

    /// Managed executable for the resolved location
    pub fn resolve_executable(&self, platform: Platform) -> Result<PathBuf, LocationError> {
        Ok(platform.executable_in(&self.resolve()?))
    }
}
