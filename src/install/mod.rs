//! Ollama installation: release download, install location and detection

pub mod detection;
pub mod download;
pub mod location;

// Public exports
pub use detection::find_executable;
pub use download::{
    AssetDownload, GitHubReleases, LATEST, PackageFormat, Platform, ReleaseSource,
    install_release,
};
pub use location::{LocationError, LocationStore, StoredLocation};
