//! Installation detection
//!
//! Finds a usable Ollama executable: the managed install first, then any
//! system-wide install made outside this tool. Existence of the executable
//! file is the only signal of "installed".

use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::download::Platform;
use super::location::LocationStore;

/// First existing executable among the managed location and `external`.
///
/// A failure to resolve the managed location is logged and the external
/// candidates are still searched.
pub fn find_executable(
    store: &LocationStore,
    platform: Platform,
    external: &[PathBuf],
) -> Option<PathBuf> {
    let managed = match store.resolve_executable(platform) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Failed to resolve managed install location: {e}");
            None
        }
    };

    managed
        .into_iter()
        .chain(external.iter().cloned())
        .find(|candidate| is_installed(candidate))
}

fn is_installed(candidate: &Path) -> bool {
    let found = candidate.is_file();
    debug!(
        "{} {}",
        if found { "Found executable at" } else { "No executable at" },
        candidate.display()
    );
    found
}
