//! GitHub release download and payload extraction
//!
//! This module handles downloading the platform-specific release asset and
//! materialising the managed executable from it.
//!
//! ## Module Organization
//!
//! - `platform` - Platform detection, asset names and install layout
//! - `github` - GitHub API interaction for release discovery
//! - `extract` - Streaming extraction (tar+gzip, zip, bare executable)
//! - `core` - Download orchestration

mod core;
pub mod extract;
mod github;
mod platform;

// Re-export public API
pub use core::{AssetDownload, ReleaseSource, install_release};
pub use github::{GitHubAsset, GitHubRelease, GitHubReleases, LATEST, RegistryError};
pub use platform::{BINARY_NAME, PackageFormat, Platform};
